use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Separator between a miner address and its payout routing suffix
/// (`username.worker` convention).
pub const PAYOUT_INFO_SEPARATOR: &str = ".";

/// A unit of accepted proof-of-work, persisted at submission time and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub miner: String,
    pub payout_info: Option<String>,
    pub stratum_difficulty: Decimal,
    pub stratum_difficulty_base: Decimal,
    pub network_difficulty: Decimal,
    pub created: DateTime<Utc>,
}

impl Share {
    /// Ledger key this share pays out to.
    pub fn payout_address(&self) -> String {
        match self.payout_info.as_deref() {
            Some(info) if !info.is_empty() => {
                format!("{}{}{}", self.miner, PAYOUT_INFO_SEPARATOR, info)
            }
            _ => self.miner.clone(),
        }
    }
}

/// A confirmed block with its payable reward. Settlement scans shares
/// submitted strictly before `created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub reward: Decimal,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub id: String,
    pub coin: String,
    pub payment_processing: Option<PaymentProcessingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessingConfig {
    /// Scheme-specific settings, opaque to everything but the scheme itself.
    pub payout_scheme_config: Option<serde_json::Value>,
}

/// Pending balance owed to one payout address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub pool_id: String,
    pub coin: String,
    pub address: String,
    pub amount: Decimal,
    pub updated: DateTime<Utc>,
}

impl BalanceRecord {
    pub fn new(pool_id: String, coin: String, address: String) -> Self {
        Self {
            pool_id,
            coin,
            address,
            amount: Decimal::ZERO,
            updated: Utc::now(),
        }
    }
}
