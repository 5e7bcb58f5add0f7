use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::{info, warn};

use crate::database::{BalanceLedger, Block, PoolRecord, ShareStore};
use crate::error::Result;
use crate::metrics::{BLOCKS_SETTLED, REWARD_CREDITED, SETTLEMENT_TIME, SHARES_PRUNED};
use crate::scorer::PplnsScorer;

/// Window size when the pool's payout-scheme config does not provide one.
pub const DEFAULT_WINDOW_FACTOR: Decimal = dec!(2.0);

/// Scheme-specific slice of the pool's payment configuration.
#[derive(Debug, Clone, Deserialize)]
struct PplnsSchemeConfig {
    factor: Option<Decimal>,
}

/// Outcome summary of one settled block.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub addresses_credited: usize,
    pub total_credited: Decimal,
    pub shares_pruned: u64,
    pub cutoff: Option<DateTime<Utc>>,
}

/// Settles confirmed blocks: scores the share window, credits the balance
/// ledger and prunes the share history behind the cutoff.
pub struct SettlementProcessor {
    scorer: PplnsScorer,
}

impl SettlementProcessor {
    pub fn new(scorer: PplnsScorer) -> Self {
        Self { scorer }
    }

    /// Distribute `block.reward` across the pool's recent shares.
    ///
    /// Ledger credits and pruning happen only after the whole window has been
    /// scored, so a scoring failure leaves both stores untouched. Callers
    /// must not settle two blocks of the same pool concurrently: pruning
    /// mutates the history a concurrent scan would be reading.
    pub async fn settle<S, L>(
        &self,
        pool: &PoolRecord,
        block: &Block,
        shares: &S,
        ledger: &L,
    ) -> Result<Settlement>
    where
        S: ShareStore + ?Sized,
        L: BalanceLedger + ?Sized,
    {
        let timer = SETTLEMENT_TIME.start_timer();
        let factor_x = window_factor(pool);

        let window = self
            .scorer
            .compute_window(&pool.id, factor_x, block, shares)
            .await?;

        let mut total_credited = Decimal::ZERO;
        for (address, amount) in &window.payouts {
            ledger
                .add_amount(&pool.id, &pool.coin, address, *amount)
                .await?;
            total_credited += *amount;
            info!("Credited {} to {} for block {}", amount, address, block.height);
        }

        let shares_pruned = match window.cutoff {
            Some(cutoff) => {
                let count = shares.count_shares_before(&pool.id, cutoff).await?;
                shares.delete_shares_before(&pool.id, cutoff).await?;
                info!("Pruned {} shares below cutoff {} for pool {}", count, cutoff, pool.id);
                count
            }
            None => 0,
        };

        BLOCKS_SETTLED.inc();
        REWARD_CREDITED.inc_by(total_credited.to_f64().unwrap_or(0.0));
        SHARES_PRUNED.inc_by(shares_pruned as f64);
        timer.observe_duration();

        Ok(Settlement {
            addresses_credited: window.payouts.len(),
            total_credited,
            shares_pruned,
            cutoff: window.cutoff,
        })
    }
}

/// Window factor from the pool's payout-scheme blob, falling back to the
/// default when absent, malformed or non-positive.
fn window_factor(pool: &PoolRecord) -> Decimal {
    let configured = pool
        .payment_processing
        .as_ref()
        .and_then(|p| p.payout_scheme_config.as_ref())
        .and_then(|raw| serde_json::from_value::<PplnsSchemeConfig>(raw.clone()).ok())
        .and_then(|config| config.factor);

    match configured {
        Some(factor) if factor > Decimal::ZERO => factor,
        Some(factor) => {
            warn!("Ignoring non-positive window factor {} for pool {}", factor, pool.id);
            DEFAULT_WINDOW_FACTOR
        }
        None => DEFAULT_WINDOW_FACTOR,
    }
}
