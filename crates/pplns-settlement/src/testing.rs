//! In-memory stand-ins for the storage traits, shared across test modules.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::database::{
    BalanceLedger, Block, PaymentProcessingConfig, PoolRecord, Share, ShareStore,
};
use crate::error::Result;

/// Timestamp `secs` seconds into an arbitrary fixed day.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// A share that scores exactly `diff` against unit difficulties.
pub fn share(miner: &str, diff: Decimal, at: i64) -> Share {
    share_for(miner, diff, dec!(1), dec!(1), at)
}

pub fn share_for(
    miner: &str,
    stratum_difficulty: Decimal,
    stratum_difficulty_base: Decimal,
    network_difficulty: Decimal,
    at: i64,
) -> Share {
    Share {
        miner: miner.to_string(),
        payout_info: None,
        stratum_difficulty,
        stratum_difficulty_base,
        network_difficulty,
        created: ts(at),
    }
}

pub fn block(height: u64, reward: Decimal, at: i64) -> Block {
    Block {
        height,
        reward,
        created: ts(at),
    }
}

pub fn pool(id: &str) -> PoolRecord {
    PoolRecord {
        id: id.to_string(),
        coin: "BTC".to_string(),
        payment_processing: None,
    }
}

pub fn pool_with_scheme(id: &str, payout_scheme_config: serde_json::Value) -> PoolRecord {
    PoolRecord {
        id: id.to_string(),
        coin: "BTC".to_string(),
        payment_processing: Some(PaymentProcessingConfig {
            payout_scheme_config: Some(payout_scheme_config),
        }),
    }
}

/// Single-pool share history kept in creation order.
pub struct MemoryShareStore {
    shares: Mutex<Vec<Share>>,
}

impl MemoryShareStore {
    pub fn new(mut shares: Vec<Share>) -> Self {
        shares.sort_by_key(|s| s.created);
        Self {
            shares: Mutex::new(shares),
        }
    }

    pub fn len(&self) -> usize {
        self.shares.lock().unwrap().len()
    }
}

#[async_trait]
impl ShareStore for MemoryShareStore {
    async fn save_share(&self, _pool_id: &str, share: &Share) -> Result<()> {
        let mut shares = self.shares.lock().unwrap();
        shares.push(share.clone());
        shares.sort_by_key(|s| s.created);
        Ok(())
    }

    async fn page_shares_before(
        &self,
        _pool_id: &str,
        before: DateTime<Utc>,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<Share>> {
        let shares = self.shares.lock().unwrap();
        Ok(shares
            .iter()
            .filter(|s| s.created < before)
            .skip(page_index * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn count_shares_before(&self, _pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let shares = self.shares.lock().unwrap();
        Ok(shares.iter().filter(|s| s.created < cutoff).count() as u64)
    }

    async fn delete_shares_before(&self, _pool_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut shares = self.shares.lock().unwrap();
        let before = shares.len();
        shares.retain(|s| s.created >= cutoff);
        Ok((before - shares.len()) as u64)
    }
}

/// Balance ledger backed by a map, keyed like the real store.
pub struct MemoryLedger {
    balances: Mutex<HashMap<(String, String, String), Decimal>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn balance(&self, pool_id: &str, coin: &str, address: &str) -> Decimal {
        let key = (pool_id.to_string(), coin.to_string(), address.to_string());
        self.balances
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.balances.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl BalanceLedger for MemoryLedger {
    async fn add_amount(
        &self,
        pool_id: &str,
        coin: &str,
        address: &str,
        amount: Decimal,
    ) -> Result<()> {
        let key = (pool_id.to_string(), coin.to_string(), address.to_string());
        *self
            .balances
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(Decimal::ZERO) += amount;
        Ok(())
    }
}
