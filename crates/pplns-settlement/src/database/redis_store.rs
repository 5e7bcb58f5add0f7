use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use rust_decimal::Decimal;
use tracing::debug;

use super::schema::{BalanceRecord, Share};
use super::{BalanceLedger, ShareStore};
use crate::error::Result;

/// Redis-backed share history and balance ledger.
///
/// Shares are stored as JSON per key, indexed by a per-pool sorted set
/// scored by submission time in milliseconds. Equal scores fall back to
/// lexicographic member order, which fixes the tie-break across restarts.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn })
    }

    fn share_index_key(pool_id: &str) -> String {
        format!("pool:{}:shares", pool_id)
    }

    fn share_key(pool_id: &str, id: &str) -> String {
        format!("pool:{}:share:{}", pool_id, id)
    }

    fn balance_key(pool_id: &str, coin: &str, address: &str) -> String {
        format!("pool:{}:balance:{}:{}", pool_id, coin, address)
    }

    /// Exclusive upper bound for score-range commands.
    fn before_bound(before: DateTime<Utc>) -> String {
        format!("({}", before.timestamp_millis())
    }
}

#[async_trait]
impl ShareStore for RedisStore {
    async fn save_share(&self, pool_id: &str, share: &Share) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let json = serde_json::to_string(share)?;
        let mut conn = self.conn.clone();

        let _: () = conn.set(Self::share_key(pool_id, &id), json).await?;
        let _: () = conn
            .zadd(
                Self::share_index_key(pool_id),
                &id,
                share.created.timestamp_millis(),
            )
            .await?;

        Ok(())
    }

    async fn page_shares_before(
        &self,
        pool_id: &str,
        before: DateTime<Utc>,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<Share>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore_limit(
                Self::share_index_key(pool_id),
                "-inf",
                Self::before_bound(before),
                (page_index * page_size) as isize,
                page_size as isize,
            )
            .await?;

        let mut shares = Vec::with_capacity(ids.len());
        for id in ids {
            let data: Option<String> = conn.get(Self::share_key(pool_id, &id)).await?;

            if let Some(json) = data {
                shares.push(serde_json::from_str(&json)?);
            }
        }

        Ok(shares)
    }

    async fn count_shares_before(&self, pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn
            .zcount(
                Self::share_index_key(pool_id),
                "-inf",
                Self::before_bound(cutoff),
            )
            .await?;

        Ok(count)
    }

    async fn delete_shares_before(&self, pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.conn.clone();
        let bound = Self::before_bound(cutoff);

        let ids: Vec<String> = conn
            .zrangebyscore(Self::share_index_key(pool_id), "-inf", &bound)
            .await?;
        for id in &ids {
            let _: () = conn.del(Self::share_key(pool_id, id)).await?;
        }

        let removed: u64 = conn
            .zrembyscore(Self::share_index_key(pool_id), "-inf", &bound)
            .await?;

        debug!("Removed {} shares for pool {}", removed, pool_id);
        Ok(removed)
    }
}

#[async_trait]
impl BalanceLedger for RedisStore {
    async fn add_amount(
        &self,
        pool_id: &str,
        coin: &str,
        address: &str,
        amount: Decimal,
    ) -> Result<()> {
        let key = Self::balance_key(pool_id, coin, address);
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(&key).await?;

        let mut record = match data {
            Some(json) => serde_json::from_str::<BalanceRecord>(&json)?,
            None => BalanceRecord::new(
                pool_id.to_string(),
                coin.to_string(),
                address.to_string(),
            ),
        };
        record.amount += amount;
        record.updated = Utc::now();

        let _: () = conn.set(&key, serde_json::to_string(&record)?).await?;
        Ok(())
    }
}
