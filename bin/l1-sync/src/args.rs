use crate::constants;
use alloy_primitives::Address;
use l1_sync::{ConsumerConfig, ProducerConfig, SynchronizerConfig, DEFAULT_EXT_CONTROL_FILE};
use l1_sync_etherman::EthermanConfig;
use std::{path::PathBuf, time::Duration};

/// The command line arguments of the L1 synchronizer node.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "l1-sync-node", about = "Synchronizes the rollup state with the events emitted on L1")]
pub struct L1SyncNodeArgs {
    /// The L1 provider arguments.
    #[command(flatten)]
    pub l1_provider_args: L1ProviderArgs,
    /// The rollup contract arguments.
    #[command(flatten)]
    pub contract_args: ContractArgs,
    /// The synchronization arguments.
    #[command(flatten)]
    pub sync_args: SyncArgs,
    /// The external control arguments.
    #[command(flatten)]
    pub ext_control_args: ExtControlArgs,
}

impl L1SyncNodeArgs {
    /// Returns the synchronizer configuration.
    pub fn synchronizer_config(&self) -> SynchronizerConfig {
        let sync = &self.sync_args;
        let ttl = (sync.ttl_of_last_block_on_l1_ms > 0)
            .then(|| Duration::from_millis(sync.ttl_of_last_block_on_l1_ms));
        let producer = ProducerConfig {
            timeout_rollup_info: sync.timeout_rollup_info_ms.map(Duration::from_millis),
            ..ProducerConfig::default()
        }
        .with_sync_chunk_size(sync.chunk_size)
        .with_ttl_of_last_block_on_l1(ttl)
        .with_min_time_between_retries_for_rollup_info(Duration::from_millis(
            sync.min_time_between_retries_ms,
        ));

        SynchronizerConfig {
            sync_interval: Duration::from_millis(sync.interval_ms),
            genesis_block_number: self.contract_args.genesis_block_number,
            max_pending_no_processed_blocks: sync.max_pending_no_processed_blocks,
            is_trusted_sequencer: sync.is_trusted_sequencer,
            producer,
            consumer: ConsumerConfig::default(),
            ..Default::default()
        }
    }

    /// Returns the contract addresses read by the L1 clients.
    pub const fn etherman_config(&self) -> EthermanConfig {
        EthermanConfig {
            rollup_address: self.contract_args.rollup_address,
            global_exit_root_manager_address: self.contract_args.global_exit_root_manager_address,
            data_committee_address: self.contract_args.data_committee_address,
        }
    }
}

/// The arguments for the L1 providers.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct L1ProviderArgs {
    /// The URLs of the L1 RPC endpoints, a worker is created for each.
    #[arg(
        long = "l1.url",
        id = "l1_urls",
        value_name = "L1_URL",
        env = "L1_SYNC_L1_URL",
        value_delimiter = ',',
        required = true
    )]
    pub urls: Vec<reqwest::Url>,
    /// The compute units per second for the provider.
    #[arg(long = "l1.cups", id = "l1_compute_units_per_second", value_name = "L1_COMPUTE_UNITS_PER_SECOND", default_value_t = constants::PROVIDER_COMPUTE_UNITS_PER_SECOND)]
    pub compute_units_per_second: u64,
    /// The max amount of retries for the provider.
    #[arg(long = "l1.max-retries", id = "l1_max_retries", value_name = "L1_MAX_RETRIES", default_value_t = constants::PROVIDER_MAX_RETRIES)]
    pub max_retries: u32,
    /// The initial backoff for the provider, in milliseconds.
    #[arg(long = "l1.initial-backoff", id = "l1_initial_backoff", value_name = "L1_INITIAL_BACKOFF", default_value_t = constants::PROVIDER_INITIAL_BACKOFF)]
    pub initial_backoff: u64,
}

/// The addresses of the rollup contracts.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct ContractArgs {
    /// The rollup contract address.
    #[arg(long = "contracts.rollup", value_name = "ADDRESS", env = "L1_SYNC_ROLLUP_ADDRESS")]
    pub rollup_address: Address,
    /// The global exit root manager contract address.
    #[arg(
        long = "contracts.global-exit-root-manager",
        value_name = "ADDRESS",
        env = "L1_SYNC_GER_MANAGER_ADDRESS"
    )]
    pub global_exit_root_manager_address: Address,
    /// The data availability committee contract address.
    #[arg(
        long = "contracts.data-committee",
        value_name = "ADDRESS",
        env = "L1_SYNC_DATA_COMMITTEE_ADDRESS",
        default_value_t = Address::ZERO
    )]
    pub data_committee_address: Address,
    /// The L1 block the rollup contract was deployed at.
    #[arg(long = "contracts.genesis-block", value_name = "BLOCK", env = "L1_SYNC_GENESIS_BLOCK")]
    pub genesis_block_number: u64,
}

/// The arguments for the synchronization.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct SyncArgs {
    /// The interval between two synchronization cycles, in milliseconds.
    #[arg(long = "sync.interval", value_name = "MS", default_value_t = constants::SYNC_INTERVAL_MS)]
    pub interval_ms: u64,
    /// The amount of blocks requested in each range.
    #[arg(long = "sync.chunk-size", value_name = "BLOCKS", default_value_t = constants::SYNC_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// How long the L1 head stays valid in milliseconds, zero if it never expires.
    #[arg(long = "sync.ttl-last-block", value_name = "MS", default_value_t = constants::TTL_OF_LAST_BLOCK_ON_L1_MS)]
    pub ttl_of_last_block_on_l1_ms: u64,
    /// The minimum time between two requests of the same range, in milliseconds.
    #[arg(long = "sync.min-time-between-retries", value_name = "MS", default_value_t = constants::MIN_TIME_BETWEEN_RETRIES_MS)]
    pub min_time_between_retries_ms: u64,
    /// The timeout of a range request, in milliseconds.
    #[arg(long = "sync.timeout-rollup-info", value_name = "MS")]
    pub timeout_rollup_info_ms: Option<u64>,
    /// The capacity of the channel between the producer and the consumer.
    #[arg(long = "sync.max-pending-blocks", value_name = "RANGES")]
    pub max_pending_no_processed_blocks: Option<usize>,
    /// Whether this node is the trusted sequencer.
    #[arg(long = "sync.trusted-sequencer", env = "L1_SYNC_IS_TRUSTED_SEQUENCER")]
    pub is_trusted_sequencer: bool,
    /// The URL of the trusted sequencer, read from L1 if not provided.
    #[arg(long = "sync.trusted-sequencer-url", value_name = "URL", env = "L1_SYNC_TRUSTED_SEQUENCER_URL")]
    pub trusted_sequencer_url: Option<String>,
}

/// The arguments for the external control.
#[derive(Debug, Clone, clap::Args)]
pub struct ExtControlArgs {
    /// Whether commands are read from the control file.
    #[arg(long = "ext-control.enabled", env = "L1_SYNC_EXT_CONTROL")]
    pub enabled: bool,
    /// The control file.
    #[arg(long = "ext-control.file", value_name = "PATH", default_value = DEFAULT_EXT_CONTROL_FILE)]
    pub file: PathBuf,
}
