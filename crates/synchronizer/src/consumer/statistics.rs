use crate::{message::RollupInfoByBlockRange, ConsumerConfig};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// Progress counters of the consumer.
#[derive(Debug, Clone)]
pub(crate) struct ConsumerStatistics {
    start_time: Instant,
    start_step: Instant,
    num_steps: usize,
    pub(crate) processed_ranges: u64,
    pub(crate) processed_blocks: u64,
    time_waiting: Duration,
    time_processing: Duration,
    starving_warnings: u64,
}

impl Default for ConsumerStatistics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            start_step: now,
            num_steps: 0,
            processed_ranges: 0,
            processed_blocks: 0,
            time_waiting: Duration::ZERO,
            time_processing: Duration::ZERO,
            starving_warnings: 0,
        }
    }
}

impl ConsumerStatistics {
    pub(crate) fn on_start(&mut self) {
        self.start_time = Instant::now();
        self.num_steps = 0;
    }

    pub(crate) fn on_reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn on_start_step(&mut self) {
        self.start_step = Instant::now();
    }

    /// Accounts the time waited for a message, warning when the consumer is starving.
    pub(crate) fn on_message_received(&mut self, config: &ConsumerConfig) {
        let waited = self.start_step.elapsed();
        self.num_steps += 1;
        self.time_waiting += waited;
        if self.num_steps > config.apply_after_num_rollup_received &&
            waited > config.acceptable_inactivity_time
        {
            self.starving_warnings += 1;
            tracing::warn!(target: "l1_sync::consumer", ?waited, acceptable = ?config.acceptable_inactivity_time, "consumer is starving, consider adding more L1 clients or increasing the chunk size");
        }
    }

    pub(crate) fn on_processed(&mut self, info: &RollupInfoByBlockRange, duration: Duration) {
        self.processed_ranges += 1;
        self.processed_blocks += info.blocks.len() as u64;
        self.time_processing += duration;
    }

    #[cfg(test)]
    pub(crate) const fn starving_warnings(&self) -> u64 {
        self.starving_warnings
    }
}

impl fmt::Display for ConsumerStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ranges {} blocks {} running {:?} waiting {:?} processing {:?} starving warnings {}",
            self.processed_ranges,
            self.processed_blocks,
            self.start_time.elapsed(),
            self.time_waiting,
            self.time_processing,
            self.starving_warnings,
        )
    }
}
