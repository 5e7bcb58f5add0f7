use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    Database(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reward overdrawn settling block {height}: {remaining} remaining before window close")]
    RewardOverdrawn { height: u64, remaining: Decimal },

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SettlementError>;
