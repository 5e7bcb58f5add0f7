use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::database::{Block, ShareStore};
use crate::error::{Result, SettlementError};

/// Shares fetched per storage round-trip.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Walk state, checked at both loop levels: `Scanning` until the accumulated
/// score reaches the window factor, `Closed` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Scanning,
    Closed,
}

/// Result of scoring one reward window.
#[derive(Debug, Clone)]
pub struct ScoredWindow {
    /// Reward owed per payout address.
    pub payouts: HashMap<String, Decimal>,
    /// Creation time of the last share the walk inspected. Shares older than
    /// this can never fall inside a later window and are safe to delete.
    /// `None` when no shares existed at all.
    pub cutoff: Option<DateTime<Utc>>,
}

/// Scores share history backwards from a block, weighting each share by its
/// difficulty normalized against the network difficulty at submission time.
///
/// The window spans as many shares as it takes for the accumulated score to
/// reach the configured factor, so it widens and narrows automatically with
/// hash-rate and difficulty swings.
pub struct PplnsScorer {
    page_size: usize,
}

impl Default for PplnsScorer {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PplnsScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Compute the reward owed to each payout address for `block`, along with
    /// the cutoff below which shares are permanently obsolete.
    ///
    /// The invariant `sum(payouts) <= block.reward` holds exactly; equality is
    /// reached when the window fills, because the boundary share is truncated
    /// to the remaining window capacity rather than its full score.
    pub async fn compute_window<S>(
        &self,
        pool_id: &str,
        factor_x: Decimal,
        block: &Block,
        shares: &S,
    ) -> Result<ScoredWindow>
    where
        S: ShareStore + ?Sized,
    {
        let mut payouts: HashMap<String, Decimal> = HashMap::new();
        let mut accumulated_score = Decimal::ZERO;
        let mut reward_remaining = block.reward;
        let mut cutoff: Option<DateTime<Utc>> = None;
        let mut state = WindowState::Scanning;
        let mut page_index = 0;

        while state == WindowState::Scanning {
            let page = shares
                .page_shares_before(pool_id, block.created, page_index, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            page_index += 1;

            // The store pages oldest-first; each page is walked in reverse.
            for share in page.iter().rev() {
                cutoff = Some(share.created);

                // Cap both difficulties at the network difficulty so a share
                // assigned more work than the network required cannot inflate
                // its score.
                let stratum_diff = share.stratum_difficulty.min(share.network_difficulty);
                let stratum_diff_base = share
                    .stratum_difficulty_base
                    .min(share.network_difficulty);

                let diff_ratio = stratum_diff / stratum_diff_base;
                let mut score = diff_ratio / share.network_difficulty;

                // The boundary share only fills whatever window capacity is
                // left.
                if accumulated_score + score >= factor_x {
                    score = factor_x - accumulated_score;
                    state = WindowState::Closed;
                }

                let reward = score * block.reward / factor_x;
                accumulated_score += score;
                reward_remaining -= reward;

                if reward_remaining <= Decimal::ZERO && state == WindowState::Scanning {
                    return Err(SettlementError::RewardOverdrawn {
                        height: block.height,
                        remaining: reward_remaining,
                    });
                }

                let address = share.payout_address();
                *payouts.entry(address).or_insert(Decimal::ZERO) += reward;

                if state == WindowState::Closed {
                    break;
                }
            }
        }

        debug!(
            "Scored {} addresses for block {}, window factor {}, {} unallocated",
            payouts.len(),
            block.height,
            factor_x,
            reward_remaining
        );

        Ok(ScoredWindow { payouts, cutoff })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block, share, share_for, MemoryShareStore};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn empty_history_yields_no_payouts_and_no_cutoff() {
        let store = MemoryShareStore::new(vec![]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert!(window.payouts.is_empty());
        assert!(window.cutoff.is_none());
    }

    #[tokio::test]
    async fn single_share_fills_half_the_window() {
        let store = MemoryShareStore::new(vec![share("alice", dec!(1), 100)]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts.len(), 1);
        assert_eq!(window.payouts["alice"], dec!(50));
        assert_eq!(window.cutoff, Some(crate::testing::ts(100)));
    }

    #[tokio::test]
    async fn second_share_closes_the_window_exactly() {
        let store = MemoryShareStore::new(vec![
            share("alice", dec!(1), 100),
            share("alice", dec!(1), 200),
        ]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["alice"], dec!(100));
        // The walk runs newest to oldest, so the older share is the second
        // one inspected and sets the final cutoff.
        assert_eq!(window.cutoff, Some(crate::testing::ts(100)));
    }

    #[tokio::test]
    async fn boundary_share_is_truncated_and_walk_stops() {
        // Scores of 0.8 each against a factor of 2.0: the third share
        // visited only fits 0.4 and the fourth is never touched.
        let store = MemoryShareStore::new(vec![
            share_for("dave", dec!(0.8), dec!(1), dec!(1), 50),
            share_for("carol", dec!(0.8), dec!(1), dec!(1), 100),
            share_for("bob", dec!(0.8), dec!(1), dec!(1), 200),
            share_for("alice", dec!(0.8), dec!(1), dec!(1), 300),
        ]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["alice"], dec!(40));
        assert_eq!(window.payouts["bob"], dec!(40));
        assert_eq!(window.payouts["carol"], dec!(20));
        assert!(!window.payouts.contains_key("dave"));
        assert_eq!(window.cutoff, Some(crate::testing::ts(100)));

        let total: Decimal = window.payouts.values().copied().sum();
        assert_eq!(total, dec!(100));
    }

    #[tokio::test]
    async fn payouts_never_exceed_the_block_reward() {
        let shares: Vec<_> = (0..25)
            .map(|i| share("alice", dec!(0.3), 100 + i))
            .collect();
        let store = MemoryShareStore::new(shares);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(12.5), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        let total: Decimal = window.payouts.values().copied().sum();
        assert!(total <= block.reward);
        assert_eq!(total, block.reward);
    }

    #[tokio::test]
    async fn payout_info_splits_and_aggregates_addresses() {
        let store = MemoryShareStore::new(vec![
            share_with_info("alice", Some("rig1"), 100),
            share_with_info("alice", Some("rig1"), 200),
            share_with_info("alice", Some("rig2"), 300),
            share_with_info("alice", None, 400),
        ]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(8.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts.len(), 3);
        assert_eq!(window.payouts["alice.rig1"], dec!(25));
        assert_eq!(window.payouts["alice.rig2"], dec!(12.5));
        assert_eq!(window.payouts["alice"], dec!(12.5));
    }

    #[tokio::test]
    async fn oversized_difficulty_is_clamped_to_network_difficulty() {
        // A share claiming far more difficulty than the network required
        // scores the same as one matching the network exactly.
        let store = MemoryShareStore::new(vec![
            share_for("honest", dec!(0.001), dec!(0.001), dec!(0.001), 100),
            share_for("oversized", dec!(1000), dec!(1000), dec!(0.001), 200),
        ]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(4000), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["oversized"], window.payouts["honest"]);
    }

    #[tokio::test]
    async fn base_difficulty_clamps_independently() {
        // stratum 5, base 10, network 2: both clamp to 2, so the ratio is 1
        // and the score is 1/2 rather than (5/10)/2.
        let store = MemoryShareStore::new(vec![share_for(
            "alice",
            dec!(5),
            dec!(10),
            dec!(2),
            100,
        )]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["alice"], dec!(25));
    }

    #[tokio::test]
    async fn shares_at_or_after_the_block_are_ignored() {
        let store = MemoryShareStore::new(vec![
            share("early", dec!(1), 100),
            share("exact", dec!(1), 1000),
            share("late", dec!(1), 2000),
        ]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(4.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts.len(), 1);
        assert!(window.payouts.contains_key("early"));
    }

    #[tokio::test]
    async fn paged_walk_reverses_each_page_and_stops_when_closed() {
        // Five shares scoring 0.5 each, paged two at a time. Pages arrive
        // oldest-first and are walked in reverse, so the visit order is
        // s2, s1, s4, s3, s5; the window closes on the fourth visit (s3)
        // and s5 is never fetched into the window.
        let store = MemoryShareStore::new(vec![
            share_for("m1", dec!(1), dec!(1), dec!(2), 100),
            share_for("m2", dec!(1), dec!(1), dec!(2), 200),
            share_for("m3", dec!(1), dec!(1), dec!(2), 300),
            share_for("m4", dec!(1), dec!(1), dec!(2), 400),
            share_for("m5", dec!(1), dec!(1), dec!(2), 500),
        ]);
        let scorer = PplnsScorer::with_page_size(2);
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["m1"], dec!(25));
        assert_eq!(window.payouts["m2"], dec!(25));
        assert_eq!(window.payouts["m3"], dec!(25));
        assert_eq!(window.payouts["m4"], dec!(25));
        assert!(!window.payouts.contains_key("m5"));
        assert_eq!(window.cutoff, Some(crate::testing::ts(300)));

        let total: Decimal = window.payouts.values().copied().sum();
        assert_eq!(total, dec!(100));
    }

    #[tokio::test]
    async fn short_history_leaves_reward_partially_unallocated() {
        let store = MemoryShareStore::new(vec![share("alice", dec!(0.25), 100)]);
        let scorer = PplnsScorer::new();
        let block = block(1, dec!(100), 1000);

        let window = scorer
            .compute_window("pool1", dec!(2.0), &block, &store)
            .await
            .unwrap();

        assert_eq!(window.payouts["alice"], dec!(12.5));
        let total: Decimal = window.payouts.values().copied().sum();
        assert!(total < block.reward);
    }

    fn share_with_info(miner: &str, info: Option<&str>, at: i64) -> crate::database::Share {
        let mut share = share(miner, dec!(1), at);
        share.payout_info = info.map(str::to_string);
        share
    }
}
