use crate::{ProducerError, WorkersConfig};
use std::time::Duration;

/// The highest fork id known to the event processors.
pub const LATEST_FORK_ID: u64 = 9;

const MIN_TTL_OF_LAST_BLOCK_ON_L1: Duration = Duration::from_secs(1);
const MIN_TIMEOUT_MAIN_LOOP: Duration = Duration::from_secs(1);
const MIN_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(1);
const MIN_APPLY_AFTER_NUM_ROLLUP_RECEIVED: usize = 5;
const MIN_ACCEPTABLE_INACTIVITY_TIME: Duration = Duration::from_secs(1);

/// Configuration for the [`crate::Producer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerConfig {
    /// The amount of blocks requested in each range, one less than the range width.
    pub sync_chunk_size: u64,
    /// How long the L1 head stays valid, `None` if it never expires.
    pub ttl_of_last_block_on_l1: Option<Duration>,
    /// The timeout of each initial L1 head request.
    pub timeout_for_request_last_block_on_l1: Duration,
    /// The amount of attempts to obtain the initial L1 head.
    pub num_of_allowed_retries_for_request_last_block_on_l1: usize,
    /// The maximum time the main loop waits for an event.
    pub time_out_main_loop: Duration,
    /// The interval between two statistics logs, zero disables them.
    pub time_for_show_up_statistics_log: Duration,
    /// The minimum time between two launches of the same range.
    pub min_time_between_retries_for_rollup_info: Duration,
    /// The timeout of a range request, `None` for no timeout.
    pub timeout_rollup_info: Option<Duration>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            sync_chunk_size: 100,
            ttl_of_last_block_on_l1: Some(Duration::from_secs(5)),
            timeout_for_request_last_block_on_l1: Duration::from_secs(5),
            num_of_allowed_retries_for_request_last_block_on_l1: 3,
            time_out_main_loop: Duration::from_secs(5 * 60),
            time_for_show_up_statistics_log: Duration::from_secs(5 * 60),
            min_time_between_retries_for_rollup_info: Duration::from_secs(5),
            timeout_rollup_info: None,
        }
    }
}

impl ProducerConfig {
    /// Sets the chunk size.
    pub const fn with_sync_chunk_size(mut self, sync_chunk_size: u64) -> Self {
        self.sync_chunk_size = sync_chunk_size;
        self
    }

    /// Sets the TTL of the L1 head.
    pub const fn with_ttl_of_last_block_on_l1(mut self, ttl: Option<Duration>) -> Self {
        self.ttl_of_last_block_on_l1 = ttl;
        self
    }

    /// Sets the maximum time the main loop waits for an event.
    pub const fn with_time_out_main_loop(mut self, timeout: Duration) -> Self {
        self.time_out_main_loop = timeout;
        self
    }

    /// Sets the minimum time between two launches of the same range.
    pub const fn with_min_time_between_retries_for_rollup_info(mut self, min: Duration) -> Self {
        self.min_time_between_retries_for_rollup_info = min;
        self
    }

    /// Returns the worker pool configuration.
    pub const fn workers(&self) -> WorkersConfig {
        WorkersConfig {
            timeout_rollup_info: self.timeout_rollup_info,
            min_time_between_retries_for_rollup_info: self.min_time_between_retries_for_rollup_info,
        }
    }

    /// Rejects a zero chunk size and warns about values below the recommended minimums.
    pub fn normalize(self) -> Result<Self, ProducerError> {
        if self.sync_chunk_size == 0 {
            return Err(ProducerError::InvalidConfig("sync_chunk_size must be greater than 0"));
        }
        if self.ttl_of_last_block_on_l1.is_some_and(|ttl| ttl < MIN_TTL_OF_LAST_BLOCK_ON_L1) {
            tracing::warn!(target: "l1_sync::producer", ttl = ?self.ttl_of_last_block_on_l1, min = ?MIN_TTL_OF_LAST_BLOCK_ON_L1, "ttl_of_last_block_on_l1 is below the recommended minimum");
        }
        if self.time_out_main_loop < MIN_TIMEOUT_MAIN_LOOP {
            tracing::warn!(target: "l1_sync::producer", timeout = ?self.time_out_main_loop, min = ?MIN_TIMEOUT_MAIN_LOOP, "time_out_main_loop is below the recommended minimum");
        }
        if self.min_time_between_retries_for_rollup_info < MIN_TIME_BETWEEN_RETRIES {
            tracing::warn!(target: "l1_sync::producer", min_time = ?self.min_time_between_retries_for_rollup_info, min = ?MIN_TIME_BETWEEN_RETRIES, "min_time_between_retries_for_rollup_info is below the recommended minimum");
        }
        Ok(self)
    }
}

/// Configuration for the [`crate::Consumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// The amount of processed ranges after which the starving check starts.
    pub apply_after_num_rollup_received: usize,
    /// The time waiting for data above which the consumer is considered starving.
    pub acceptable_inactivity_time: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { apply_after_num_rollup_received: 10, acceptable_inactivity_time: Duration::from_secs(5) }
    }
}

impl ConsumerConfig {
    /// Warns about values below the recommended minimums.
    pub fn normalize(self) -> Self {
        if self.acceptable_inactivity_time < MIN_ACCEPTABLE_INACTIVITY_TIME {
            tracing::warn!(target: "l1_sync::consumer", time = ?self.acceptable_inactivity_time, min = ?MIN_ACCEPTABLE_INACTIVITY_TIME, "acceptable_inactivity_time is below the recommended minimum");
        }
        if self.apply_after_num_rollup_received < MIN_APPLY_AFTER_NUM_ROLLUP_RECEIVED {
            tracing::warn!(target: "l1_sync::consumer", value = self.apply_after_num_rollup_received, min = MIN_APPLY_AFTER_NUM_ROLLUP_RECEIVED, "apply_after_num_rollup_received is below the recommended minimum");
        }
        self
    }
}

/// Configuration for the [`crate::Synchronizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizerConfig {
    /// The interval between two synchronization cycles.
    pub sync_interval: Duration,
    /// The L1 block the rollup contract was deployed at.
    pub genesis_block_number: u64,
    /// The capacity of the channel between the producer and the consumer, `None` for twice the
    /// amount of L1 clients.
    pub max_pending_no_processed_blocks: Option<usize>,
    /// Whether this node is the trusted sequencer.
    pub is_trusted_sequencer: bool,
    /// The fork ids the event processors are registered for.
    pub fork_ids: Vec<u64>,
    /// The producer configuration.
    pub producer: ProducerConfig,
    /// The consumer configuration.
    pub consumer: ConsumerConfig,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(1),
            genesis_block_number: 0,
            max_pending_no_processed_blocks: None,
            is_trusted_sequencer: false,
            fork_ids: (0..=LATEST_FORK_ID).collect(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl SynchronizerConfig {
    /// Returns the capacity of the channel between the producer and the consumer.
    pub fn channel_capacity(&self, num_workers: usize) -> usize {
        self.max_pending_no_processed_blocks.unwrap_or(2 * num_workers).max(1)
    }
}
