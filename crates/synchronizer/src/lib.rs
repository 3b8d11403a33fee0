//! Synchronizes the state of a zkEVM rollup node with the rollup events emitted on L1.
//!
//! A [`Producer`] requests the rollup information of consecutive L1 block ranges in parallel
//! through a [`WorkerPool`], and an [`OrderingFilter`] releases the responses in block order to
//! a [`Consumer`], which applies them to the state through a [`BlockRangeProcessor`]. The
//! [`Orchestrator`] runs both for each synchronization cycle of the [`Synchronizer`].

mod batch_data;
pub use batch_data::{
    BatchDataProvider, BatchDataRetriever, DataCommitteeClient, DataCommitteeClientFactory,
    RpcDataCommitteeClient, RpcDataCommitteeClientFactory, RpcTrustedSequencerClient,
    TrustedSequencerClient,
};

mod block_range;
pub use block_range::{LiveBlockRange, LiveBlockRanges};

mod config;
pub use config::{ConsumerConfig, ProducerConfig, SynchronizerConfig, LATEST_FORK_ID};

mod consumer;
pub use consumer::{Consumer, ConsumerHandle};

mod error;
pub use error::{
    BatchDataError, BatchDataSource, BlockRangeProcessError, ConsumerError, ExtControlError,
    FilterError, FlushIdError, OrchestratorError, ProcessorError, ProducerError,
    SyncStatusError, SynchronizerError, WorkerError,
};

mod ext_control;
pub use ext_control::{ExtControl, ExtControlCmd, DEFAULT_EXT_CONTROL_FILE};

mod filter;
pub use filter::OrderingFilter;

mod flush_id;
pub use flush_id::FlushIdController;

mod last_block;
pub use last_block::LastBlockOnL1;

pub mod message;

mod metrics;

mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorHandle};

mod processor;
pub use processor::{
    BlockRangeProcessor, L1EventProcessor, L1EventProcessorManager, StateBlockRangeProcessor,
    StateEventProcessor,
};

mod producer;
pub use producer::{Producer, ProducerCommand, ProducerHandle, ProducerStatus};

mod retry;

mod sync_status;
pub use sync_status::{NewLastBlockResponse, SyncStatus, SyncStatusState, UNSAFE_AREA_BLOCKS};

mod synchronizer;
pub use synchronizer::Synchronizer;

mod worker;
pub use worker::{Worker, WorkerStatus};

mod workers;
pub use workers::{WorkerPool, WorkersConfig};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers
pub mod test_utils;
