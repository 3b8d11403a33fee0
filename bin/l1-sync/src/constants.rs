/// The max retries for the L1 provider.
pub(crate) const PROVIDER_MAX_RETRIES: u32 = 10;

/// The initial backoff for the L1 provider, in milliseconds.
pub(crate) const PROVIDER_INITIAL_BACKOFF: u64 = 100;

/// The default provider compute units per second.
pub(crate) const PROVIDER_COMPUTE_UNITS_PER_SECOND: u64 = 330;

/// The default interval between two synchronization cycles, in milliseconds.
pub(crate) const SYNC_INTERVAL_MS: u64 = 1000;

/// The default amount of blocks requested in each range.
pub(crate) const SYNC_CHUNK_SIZE: u64 = 100;

/// The default TTL of the L1 head, in milliseconds.
pub(crate) const TTL_OF_LAST_BLOCK_ON_L1_MS: u64 = 5000;

/// The default minimum time between two launches of the same range, in milliseconds.
pub(crate) const MIN_TIME_BETWEEN_RETRIES_MS: u64 = 5000;
