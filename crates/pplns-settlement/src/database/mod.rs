pub mod redis_store;
pub mod schema;

pub use redis_store::RedisStore;
pub use schema::{
    BalanceRecord, Block, PaymentProcessingConfig, PoolRecord, Share, PAYOUT_INFO_SEPARATOR,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;

/// Access to a pool's share history.
#[async_trait]
pub trait ShareStore: Send + Sync {
    /// Persist a share for later settlement.
    async fn save_share(&self, pool_id: &str, share: &Share) -> Result<()>;

    /// Fetch one page of shares submitted strictly before `before`, ordered
    /// ascending by creation time. An empty page marks the end of history.
    async fn page_shares_before(
        &self,
        pool_id: &str,
        before: DateTime<Utc>,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<Share>>;

    /// Number of shares submitted strictly before `cutoff`.
    async fn count_shares_before(&self, pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete all shares submitted strictly before `cutoff`, returning how
    /// many were removed.
    async fn delete_shares_before(&self, pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Pending-balance ledger, keyed by pool, coin and payout address.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Add `amount` to the address's pending balance, starting from zero for
    /// an unknown address.
    async fn add_amount(
        &self,
        pool_id: &str,
        coin: &str,
        address: &str,
        amount: Decimal,
    ) -> Result<()>;
}
