use crate::{
    Batch, ProcessBatchRequest, ProcessBatchResponse, StateError, StoredFlushId, VirtualBatch,
};
use alloy_primitives::Bytes;
use l1_sync_primitives::{
    BatchSequence, ForcedBatch, ForkIdInterval, GlobalExitRoot, L1BlockHeader, L1InfoTreeLeaf,
    VerifiedBatch,
};

/// The persistent state of the node, as consumed by the synchronizer.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait StateStore: Send + Sync {
    /// The write transaction type.
    type Tx: StateTx + std::fmt::Debug;

    /// Begins a new write transaction.
    async fn begin_state_transaction(&self) -> Result<Self::Tx, StateError>;

    /// Returns the last stored L1 block.
    async fn get_last_block(&self) -> Result<Option<L1BlockHeader>, StateError>;

    /// Returns the stored L1 block `offset` positions below the last one. An offset of 0 returns
    /// the last block.
    async fn get_previous_block(&self, offset: u64) -> Result<Option<L1BlockHeader>, StateError>;

    /// Returns the flush id the executor reports as durably stored.
    async fn get_stored_flush_id(&self) -> Result<StoredFlushId, StateError>;

    /// Returns the batch with the provided number.
    async fn get_batch_by_number(&self, batch_number: u64) -> Result<Option<Batch>, StateError>;

    /// Returns the L2 data of the provided batch.
    async fn get_batch_l2_data(&self, batch_number: u64) -> Result<Option<Bytes>, StateError>;

    /// Returns the number of the last stored batch, 0 if none.
    async fn get_last_batch_number(&self) -> Result<u64, StateError>;

    /// Removes all the L1 data above the provided block number.
    async fn reset(&self, block_number: u64) -> Result<(), StateError>;

    /// Removes all the batches above the provided batch number.
    async fn reset_trusted_state(&self, batch_number: u64) -> Result<(), StateError>;

    /// Returns the fork id active at the provided batch.
    fn fork_id_by_batch_number(&self, batch_number: u64) -> u64;

    /// Returns the fork id active at the provided L1 block.
    fn fork_id_by_block_number(&self, block_number: u64) -> u64;
}

/// A write transaction on the state. Dropping it without committing discards its writes.
#[async_trait::async_trait]
pub trait StateTx: Send {
    /// Stores an L1 block.
    async fn add_block(&mut self, header: &L1BlockHeader) -> Result<(), StateError>;

    /// Stores a global exit root.
    async fn add_global_exit_root(&mut self, ger: &GlobalExitRoot) -> Result<(), StateError>;

    /// Appends a leaf to the L1 info tree, returning its index.
    async fn add_l1_info_tree_leaf(&mut self, leaf: &L1InfoTreeLeaf) -> Result<u64, StateError>;

    /// Stores a forced batch.
    async fn add_forced_batch(&mut self, batch: &ForcedBatch) -> Result<(), StateError>;

    /// Stores a sequence of batches.
    async fn add_sequence(
        &mut self,
        sequence: &BatchSequence,
        block_number: u64,
    ) -> Result<(), StateError>;

    /// Stores a batch sequenced on L1.
    async fn add_virtual_batch(&mut self, batch: &VirtualBatch) -> Result<(), StateError>;

    /// Stores a verified batch.
    async fn add_verified_batch(&mut self, batch: &VerifiedBatch) -> Result<(), StateError>;

    /// Stores a fork id interval, closing the previous active interval.
    async fn add_fork_id_interval(&mut self, interval: &ForkIdInterval) -> Result<(), StateError>;

    /// Overwrites the L2 data of a batch, creating a closed batch if it does not exist.
    async fn update_batch_l2_data(
        &mut self,
        batch_number: u64,
        data: &Bytes,
    ) -> Result<(), StateError>;

    /// Opens a new batch.
    async fn open_batch(&mut self, batch: &Batch) -> Result<(), StateError>;

    /// Executes a batch against the executor.
    async fn process_batch(
        &mut self,
        request: &ProcessBatchRequest,
    ) -> Result<ProcessBatchResponse, StateError>;

    /// Closes a previously opened batch.
    async fn close_batch(&mut self, batch_number: u64) -> Result<(), StateError>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), StateError>;

    /// Rolls back the transaction.
    async fn rollback(self) -> Result<(), StateError>;
}
