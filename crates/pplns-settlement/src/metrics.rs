use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, TextEncoder};

lazy_static! {
    pub static ref BLOCKS_SETTLED: Counter = Counter::new(
        "pool_blocks_settled_total",
        "Total number of blocks settled"
    ).unwrap();

    pub static ref REWARD_CREDITED: Counter = Counter::new(
        "pool_reward_credited_total",
        "Total reward amount credited to pending balances"
    ).unwrap();

    pub static ref SHARES_PRUNED: Counter = Counter::new(
        "pool_shares_pruned_total",
        "Total number of shares deleted behind the payout window"
    ).unwrap();

    pub static ref SETTLEMENT_TIME: Histogram = Histogram::with_opts(
        HistogramOpts::new("pool_settlement_seconds", "Time to settle a block")
    ).unwrap();
}

pub fn register_metrics() {
    prometheus::register(Box::new(BLOCKS_SETTLED.clone())).unwrap();
    prometheus::register(Box::new(REWARD_CREDITED.clone())).unwrap();
    prometheus::register(Box::new(SHARES_PRUNED.clone())).unwrap();
    prometheus::register(Box::new(SETTLEMENT_TIME.clone())).unwrap();
}

pub fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
