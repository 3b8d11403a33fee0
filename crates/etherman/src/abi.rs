//! The subset of the rollup contracts ABI the synchronizer decodes.

use alloy_primitives::Log;
use alloy_sol_types::{sol, SolEvent};

sol! {
    // *********************EVENTS*********************
    #[derive(Debug)]
    event SequenceBatches(uint64 indexed numBatch, bytes32 l1InfoRoot);

    #[derive(Debug)]
    event ForceBatch(
        uint64 indexed forceBatchNum,
        bytes32 lastGlobalExitRoot,
        address sequencer,
        bytes transactions
    );

    #[derive(Debug)]
    event SequenceForceBatches(uint64 indexed numBatch);

    #[derive(Debug)]
    event VerifyBatchesTrustedAggregator(
        uint64 indexed numBatch,
        bytes32 stateRoot,
        address indexed aggregator
    );

    #[derive(Debug)]
    event VerifyBatches(uint64 indexed numBatch, bytes32 stateRoot, address indexed aggregator);

    #[derive(Debug)]
    event UpdateGlobalExitRoot(bytes32 indexed mainnetExitRoot, bytes32 indexed rollupExitRoot);

    #[derive(Debug)]
    event UpdateL1InfoTree(bytes32 indexed mainnetExitRoot, bytes32 indexed rollupExitRoot);

    #[derive(Debug)]
    event UpdateZkEVMVersion(uint64 numBatch, uint64 forkID, string version);

    #[derive(Debug)]
    event UpdateEtrogSequence(
        uint64 numBatch,
        bytes transactions,
        bytes32 lastGlobalExitRoot,
        address sequencer
    );

    // *********************STRUCTS*********************
    struct BatchData {
        bytes transactions;
        bytes32 forcedGlobalExitRoot;
        uint64 forcedTimestamp;
        bytes32 forcedBlockHashL1;
    }

    struct ValidiumBatchData {
        bytes32 transactionsHash;
        bytes32 forcedGlobalExitRoot;
        uint64 forcedTimestamp;
        bytes32 forcedBlockHashL1;
    }

    struct ForcedBatchData {
        bytes transactions;
        bytes32 forcedGlobalExitRoot;
        uint64 forcedTimestamp;
        bytes32 forcedBlockHashL1;
    }

    // *********************FUNCTION*********************
    function sequenceBatches(BatchData[] batches, address l2Coinbase) external;

    function sequenceBatches(
        BatchData[] batches,
        uint64 maxSequenceTimestamp,
        uint64 initSequencedBatch,
        address l2Coinbase
    ) external;

    function sequenceBatchesValidium(
        ValidiumBatchData[] batches,
        uint64 maxSequenceTimestamp,
        uint64 initSequencedBatch,
        address l2Coinbase,
        bytes dataAvailabilityMessage
    ) external;

    function sequenceForceBatches(ForcedBatchData[] batches) external;

    function lastBatchSequenced() external view returns (uint64);

    function trustedSequencerURL() external view returns (string);

    function requiredAmountOfSignatures() external view returns (uint256);

    function committeeHash() external view returns (bytes32);

    function getAmountOfMembers() external view returns (uint256);

    function members(uint256 index) external view returns (string url, address addr);
}

/// All the event signatures the synchronizer filters for.
pub const ROLLUP_EVENT_SIGNATURES: [alloy_primitives::B256; 9] = [
    SequenceBatches::SIGNATURE_HASH,
    ForceBatch::SIGNATURE_HASH,
    SequenceForceBatches::SIGNATURE_HASH,
    VerifyBatchesTrustedAggregator::SIGNATURE_HASH,
    VerifyBatches::SIGNATURE_HASH,
    UpdateGlobalExitRoot::SIGNATURE_HASH,
    UpdateL1InfoTree::SIGNATURE_HASH,
    UpdateZkEVMVersion::SIGNATURE_HASH,
    UpdateEtrogSequence::SIGNATURE_HASH,
];

/// Tries to decode the provided log into the type T.
pub fn try_decode_log<T: SolEvent>(log: &Log) -> Option<Log<T>> {
    T::decode_log(log).ok()
}
