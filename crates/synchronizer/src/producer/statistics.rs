use l1_sync_primitives::BlockRange;
use std::{
    fmt,
    time::{Duration, Instant},
};

/// Progress counters of the producer, logged periodically.
#[derive(Debug, Clone)]
pub(crate) struct ProducerStatistics {
    start_time: Instant,
    pub(crate) last_show_up: Instant,
    start_block: u64,
    last_block_on_l1: u64,
    requests_launched: u64,
    responses_ok: u64,
    responses_err: u64,
    blocks_retrieved: u64,
    time_requesting: Duration,
}

impl ProducerStatistics {
    pub(crate) fn new(start_block: u64) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_show_up: now,
            start_block,
            last_block_on_l1: 0,
            requests_launched: 0,
            responses_ok: 0,
            responses_err: 0,
            blocks_retrieved: 0,
            time_requesting: Duration::ZERO,
        }
    }

    pub(crate) fn reset(&mut self, start_block: u64) {
        *self = Self::new(start_block);
    }

    pub(crate) fn on_new_last_block(&mut self, last_block_on_l1: u64) {
        self.last_block_on_l1 = last_block_on_l1;
    }

    pub(crate) fn on_request_launched(&mut self) {
        self.requests_launched += 1;
    }

    pub(crate) fn on_response(&mut self, block_range: &BlockRange, successful: bool, duration: Duration) {
        self.time_requesting += duration;
        if successful {
            self.responses_ok += 1;
            self.blocks_retrieved += block_range.block_count();
        } else {
            self.responses_err += 1;
        }
    }

    fn blocks_to_retrieve(&self) -> u64 {
        self.last_block_on_l1.saturating_sub(self.start_block)
    }

    /// Returns the percentage of blocks retrieved since the start.
    pub(crate) fn percentage(&self) -> f64 {
        let total = self.blocks_to_retrieve();
        if total == 0 {
            return 100.0;
        }
        (self.blocks_retrieved as f64 * 100.0 / total as f64).min(100.0)
    }

    /// Extrapolates the remaining time from the pace so far.
    pub(crate) fn eta(&self) -> Option<Duration> {
        if self.blocks_retrieved == 0 {
            return None;
        }
        let remaining = self.blocks_to_retrieve().saturating_sub(self.blocks_retrieved);
        let per_block = self.start_time.elapsed().as_secs_f64() / self.blocks_retrieved as f64;
        Some(Duration::from_secs_f64(per_block * remaining as f64))
    }
}

impl fmt::Display for ProducerStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean_request_time = if self.responses_ok + self.responses_err == 0 {
            Duration::ZERO
        } else {
            self.time_requesting / (self.responses_ok + self.responses_err) as u32
        };
        write!(
            f,
            "blocks [{}/{}] {:.2}% eta {:?}, requests launched {} ok {} err {}, mean request time {:?}",
            self.blocks_retrieved,
            self.blocks_to_retrieve(),
            self.percentage(),
            self.eta(),
            self.requests_launched,
            self.responses_ok,
            self.responses_err,
            mean_request_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut statistics = ProducerStatistics::new(100);
        assert_eq!(statistics.eta(), None);
        statistics.on_new_last_block(200);

        statistics.on_response(&BlockRange::new(101, 150), true, Duration::from_millis(10));
        statistics.on_response(&BlockRange::new(151, 160), false, Duration::from_millis(10));

        assert_eq!(statistics.percentage(), 50.0);
        assert!(statistics.eta().is_some());
    }
}
