use crate::message::RollupInfoByBlockRange;
use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;
use std::time::Duration;

/// The metrics for the [`super::Producer`].
#[derive(Metrics, Clone)]
#[metrics(scope = "l1_sync.producer")]
pub(crate) struct ProducerMetrics {
    /// A counter on the ranges requested.
    pub(crate) ranges_requested: Counter,
    /// A counter on the ranges received successfully.
    pub(crate) range_successes: Counter,
    /// A counter on the ranges that failed.
    pub(crate) range_errors: Counter,
    /// A histogram of the range requests latency.
    pub(crate) range_latency: Histogram,
    /// The last block on L1.
    pub(crate) last_block_on_l1: Gauge,
    /// A counter on the transitions to synchronized.
    pub(crate) synchronized_edges: Counter,
}

impl ProducerMetrics {
    /// Records the outcome of a range request.
    pub(crate) fn record_response(&self, successful: bool, duration: Duration) {
        if successful {
            self.range_successes.increment(1);
        } else {
            self.range_errors.increment(1);
        }
        self.range_latency.record(duration.as_secs_f64());
    }
}

/// The metrics for the [`super::Consumer`].
#[derive(Metrics, Clone)]
#[metrics(scope = "l1_sync.consumer")]
pub(crate) struct ConsumerMetrics {
    /// A counter on the processed ranges.
    pub(crate) processed_ranges: Counter,
    /// A counter on the processed blocks.
    pub(crate) processed_blocks: Counter,
    /// A counter on the ranges without rollup blocks.
    pub(crate) empty_ranges: Counter,
    /// A histogram of the time spent processing a range.
    pub(crate) processing_duration: Histogram,
    /// The last synced block.
    pub(crate) last_synced_block: Gauge,
}

impl ConsumerMetrics {
    /// Records a processed range.
    pub(crate) fn record_range(&self, info: &RollupInfoByBlockRange, duration: Duration) {
        self.processed_ranges.increment(1);
        self.processed_blocks.increment(info.blocks.len() as u64);
        if info.blocks.is_empty() {
            self.empty_ranges.increment(1);
        }
        self.processing_duration.record(duration.as_secs_f64());
        self.last_synced_block.set(info.block_range.to as f64);
    }
}

/// The metrics for the [`super::FlushIdController`].
#[derive(Metrics, Clone)]
#[metrics(scope = "l1_sync.flush_id")]
pub(crate) struct FlushIdMetrics {
    /// A counter on the waits for the executor to flush.
    pub(crate) blocked_waits: Counter,
    /// A histogram of the time waited for the executor to flush.
    pub(crate) wait_duration: Histogram,
}
