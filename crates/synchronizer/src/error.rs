use l1_sync_etherman::EthermanError;
use l1_sync_primitives::{BlockRange, EventOrder};
use l1_sync_state::StateError;

/// A [`Result`] that uses [`SynchronizerError`] as the error type.
pub(crate) type SynchronizerResult<T> = Result<T, SynchronizerError>;

/// A scheduler invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncStatusError {
    /// The range is not valid.
    #[error("invalid block range {0}")]
    InvalidRange(BlockRange),
    /// The range overlaps a range already tracked.
    #[error("block range {range} overlaps {existing}")]
    Overlap {
        /// The inserted range.
        range: BlockRange,
        /// The tracked range it overlaps with.
        existing: BlockRange,
    },
    /// The range is not tracked.
    #[error("unknown block range {0}")]
    UnknownRange(BlockRange),
}

/// An error returned by the [`crate::OrderingFilter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A range that starts at or below the last released block was received again.
    #[error("block range {range} was already delivered, last released block is {last_block}")]
    AlreadyDelivered {
        /// The received range.
        range: BlockRange,
        /// The last block released to the consumer.
        last_block: u64,
    },
}

/// An error returned by a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker is already executing a request.
    #[error("worker is busy")]
    WorkerBusy,
    /// All the workers of the pool are executing a request.
    #[error("all workers are busy")]
    AllWorkersBusy,
    /// The pool has no workers.
    #[error("no workers available")]
    NoWorkers,
    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// The worker task was cancelled.
    #[error("worker task cancelled")]
    Cancelled,
    /// The L1 client returned an error.
    #[error(transparent)]
    Etherman(#[from] EthermanError),
}

/// An error returned by the [`crate::Producer`].
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The configuration is not usable.
    #[error("invalid producer configuration: {0}")]
    InvalidConfig(&'static str),
    /// Could not obtain the initial L1 head.
    #[error("failed to request the initial last block on L1: {0}")]
    InitialLastBlock(WorkerError),
    /// A scheduler invariant was violated.
    #[error(transparent)]
    SyncStatus(#[from] SyncStatusError),
    /// The ordering filter rejected a message.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The consumer dropped its end of the channel.
    #[error("outgoing channel closed")]
    OutgoingChannelClosed,
}

/// An error returned by the [`crate::Consumer`].
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The block preceding a range does not match the one previously received.
    #[error("L1 reorg detected at block {block_number}")]
    L1Reorg {
        /// The block whose hash or parent hash changed.
        block_number: u64,
    },
    /// The producer reported a different highest block than the one processed.
    #[error(
        "consumer and producer are desynchronized: processed {processed}, producer reached {producer}"
    )]
    Desynchronized {
        /// The highest block processed by the consumer.
        processed: u64,
        /// The highest block reported by the producer.
        producer: u64,
    },
    /// The incoming channel was closed.
    #[error("incoming channel closed")]
    IncomingChannelClosed,
    /// Applying a range to the state failed.
    #[error(transparent)]
    Process(#[from] BlockRangeProcessError),
}

/// An error returned by the [`crate::FlushIdController`].
#[derive(Debug, thiserror::Error)]
pub enum FlushIdError {
    /// The executor restarted, the flush ids it reported so far can no longer be trusted.
    #[error("prover id changed from {previous} to {current}, the executor restarted")]
    ProverIdChanged {
        /// The prover id observed first.
        previous: String,
        /// The prover id reported now.
        current: String,
    },
    /// Reading the stored flush id failed.
    #[error(transparent)]
    State(#[from] StateError),
}

/// An error returned by an [`crate::L1EventProcessor`] or the manager dispatching to them.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A processor is already registered for the pair.
    #[error("processor already registered for fork {fork_id} and event {event}")]
    DuplicateProcessor {
        /// The fork id.
        fork_id: u64,
        /// The event.
        event: EventOrder,
    },
    /// No processor is registered for the pair.
    #[error("no processor registered for fork {fork_id} and event {event}")]
    UnregisteredProcessor {
        /// The fork id.
        fork_id: u64,
        /// The event.
        event: EventOrder,
    },
    /// The order points at an event the block does not carry.
    #[error("block {block_number} has no {event} at position {pos}")]
    MissingEvent {
        /// The block number.
        block_number: u64,
        /// The event.
        event: EventOrder,
        /// The position in the block's event list.
        pos: usize,
    },
    /// The state store returned an error.
    #[error(transparent)]
    State(#[from] StateError),
    /// The flush id barrier failed.
    #[error(transparent)]
    FlushId(#[from] FlushIdError),
    /// The batch data could not be retrieved.
    #[error(transparent)]
    BatchData(#[from] BatchDataError),
}

/// An error returned while applying a range of blocks to the state.
#[derive(Debug, thiserror::Error)]
pub enum BlockRangeProcessError {
    /// An event processor failed.
    #[error("failed to process block {block_number}: {error}")]
    Processor {
        /// The block being processed.
        block_number: u64,
        /// The processor error.
        error: ProcessorError,
    },
    /// The state store returned an error.
    #[error(transparent)]
    State(#[from] StateError),
    /// The flush id barrier failed.
    #[error(transparent)]
    FlushId(#[from] FlushIdError),
}

/// The source of batch data.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum BatchDataSource {
    /// The local state store.
    #[display("local")]
    Local,
    /// The trusted sequencer.
    #[display("trusted sequencer")]
    TrustedSequencer,
    /// A data committee member.
    #[display("committee member {_0}")]
    Committee(String),
}

/// An error returned by the [`crate::BatchDataRetriever`].
#[derive(Debug, thiserror::Error)]
pub enum BatchDataError {
    /// None of the sources returned data matching the expected hash.
    #[error("batch {batch_number} data not found, tried {}", format_sources(.tried))]
    NotFound {
        /// The batch number.
        batch_number: u64,
        /// The sources tried.
        tried: Vec<BatchDataSource>,
    },
    /// A source returned data whose hash does not match.
    #[error("batch {batch_number} data from {origin} has hash {actual}, expected {expected}")]
    HashMismatch {
        /// The batch number.
        batch_number: u64,
        /// The source.
        origin: BatchDataSource,
        /// The expected hash.
        expected: alloy_primitives::B256,
        /// The hash of the data returned.
        actual: alloy_primitives::B256,
    },
    /// A JSON-RPC request failed.
    #[error("rpc request to {origin} failed: {error}")]
    Rpc {
        /// The source.
        origin: BatchDataSource,
        /// The error message.
        error: String,
    },
    /// The URL of a source is not valid.
    #[error("invalid url {0}")]
    InvalidUrl(String),
    /// The committee could not be reloaded.
    #[error(transparent)]
    Etherman(#[from] EthermanError),
    /// The state store returned an error.
    #[error(transparent)]
    State(#[from] StateError),
}

fn format_sources(sources: &[BatchDataSource]) -> String {
    sources.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// An error returned by the [`crate::Orchestrator`].
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The producer failed.
    #[error(transparent)]
    Producer(#[from] ProducerError),
    /// The consumer failed.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
    /// Both tasks finished cleanly but no block was applied.
    #[error("orchestrator finished without a last synced block")]
    MissingLastBlockSynced,
    /// A previous run was aborted, the producer and consumer are gone.
    #[error("orchestrator was aborted")]
    Aborted,
    /// A task panicked or was cancelled.
    #[error("orchestrator task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl OrchestratorError {
    /// Returns true if the error requires a restart of the process. Other errors are recovered
    /// by restarting the cycle from the last block in the state.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Producer(ProducerError::InitialLastBlock(_)) |
            Self::Consumer(ConsumerError::L1Reorg { .. } | ConsumerError::Desynchronized { .. }) |
            Self::MissingLastBlockSynced => false,
            Self::Consumer(ConsumerError::Process(err)) => err.is_fatal(),
            Self::Producer(_) |
            Self::Consumer(ConsumerError::IncomingChannelClosed) |
            Self::Aborted |
            Self::Join(_) => true,
        }
    }
}

impl BlockRangeProcessError {
    /// Returns true if the executor restarted while the range was processed.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FlushId(FlushIdError::ProverIdChanged { .. }) |
                Self::Processor {
                    error: ProcessorError::FlushId(FlushIdError::ProverIdChanged { .. }),
                    ..
                }
        )
    }
}

/// An error returned by the external control.
#[derive(Debug, thiserror::Error)]
pub enum ExtControlError {
    /// The command is not registered.
    #[error("unknown command {0}")]
    UnknownCommand(String),
    /// The arguments are not valid for the command.
    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments {
        /// The command.
        command: String,
        /// Why the arguments were rejected.
        reason: String,
    },
    /// Reading the command file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The top level error of the synchronizer.
#[derive(Debug, thiserror::Error)]
pub enum SynchronizerError {
    /// The rollup contract was not deployed at the configured genesis block.
    #[error("genesis block {0} does not match the rollup deployment block")]
    InvalidGenesisBlock(u64),
    /// The state has no blocks after the genesis was stored.
    #[error("state has no last block")]
    MissingLastBlock,
    /// None of the stored blocks matches L1.
    #[error("L1 reorg deeper than the stored blocks, last checked block {0}")]
    ReorgBeyondStoredBlocks(u64),
    /// The orchestrator failed.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    /// Processing the genesis block failed.
    #[error(transparent)]
    Process(#[from] BlockRangeProcessError),
    /// The L1 client returned an error.
    #[error(transparent)]
    Etherman(#[from] EthermanError),
    /// The state store returned an error.
    #[error(transparent)]
    State(#[from] StateError),
    /// The configuration is not usable.
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_data_not_found_names_sources() {
        let err = BatchDataError::NotFound {
            batch_number: 7,
            tried: vec![
                BatchDataSource::Local,
                BatchDataSource::TrustedSequencer,
                BatchDataSource::Committee("http://dac-0".to_string()),
            ],
        };

        assert_eq!(
            err.to_string(),
            "batch 7 data not found, tried local, trusted sequencer, committee member http://dac-0"
        );
    }
}
