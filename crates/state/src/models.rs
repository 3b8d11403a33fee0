use alloy_primitives::{Address, Bytes, B256};

/// The flush id the executor reports as durably stored, with the identity of the executor process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoredFlushId {
    /// The highest flush id persisted by the executor.
    pub flush_id: u64,
    /// The identifier of the executor process.
    pub prover_id: String,
}

/// An L2 batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    /// The batch number.
    pub batch_number: u64,
    /// The L2 coinbase.
    pub coinbase: Address,
    /// The batch L2 data.
    pub batch_l2_data: Bytes,
    /// The state root after executing the batch.
    pub state_root: B256,
    /// The global exit root of the batch.
    pub global_exit_root: B256,
    /// The batch timestamp.
    pub timestamp: u64,
    /// The forced batch number, if the batch was forced.
    pub forced_batch_number: Option<u64>,
    /// Whether the batch is closed.
    pub closed: bool,
}

/// A batch sequenced on L1.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VirtualBatch {
    /// The batch number.
    pub batch_number: u64,
    /// The sequencing transaction hash.
    pub tx_hash: B256,
    /// The L2 coinbase.
    pub coinbase: Address,
    /// The address that sequenced the batch.
    pub sequencer: Address,
    /// The L1 block the batch was sequenced at.
    pub block_number: u64,
    /// The L1 info root the batch was sequenced against.
    pub l1_info_root: Option<B256>,
}

/// A request to execute a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessBatchRequest {
    /// The batch number.
    pub batch_number: u64,
    /// The L2 coinbase.
    pub coinbase: Address,
    /// The batch L2 data.
    pub transactions: Bytes,
    /// The global exit root used by the batch.
    pub global_exit_root: B256,
    /// The batch timestamp.
    pub timestamp: u64,
}

/// The outcome of executing a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessBatchResponse {
    /// The state root after the batch.
    pub new_state_root: B256,
    /// The flush id assigned by the executor to the writes of the batch.
    pub flush_id: u64,
    /// The identifier of the executor process.
    pub prover_id: String,
}
