use crate::{
    Batch, ProcessBatchRequest, ProcessBatchResponse, StateError, StateStore, StateTx,
    StoredFlushId, VirtualBatch,
};
use alloy_primitives::{keccak256, Bytes, B256};
use l1_sync_primitives::{
    BatchSequence, ForcedBatch, ForkIdInterval, GlobalExitRoot, L1BlockHeader, L1InfoTreeLeaf,
    VerifiedBatch,
};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

/// The prover id reported by the in-memory executor by default.
pub const DEFAULT_PROVER_ID: &str = "in-memory-executor";

/// The committed data of the [`InMemoryState`].
#[derive(Debug, Default, Clone)]
struct StateData {
    blocks: BTreeMap<u64, L1BlockHeader>,
    global_exit_roots: Vec<GlobalExitRoot>,
    l1_info_tree: Vec<L1InfoTreeLeaf>,
    forced_batches: BTreeMap<u64, ForcedBatch>,
    sequences: Vec<(BatchSequence, u64)>,
    virtual_batches: BTreeMap<u64, VirtualBatch>,
    verified_batches: BTreeMap<u64, VerifiedBatch>,
    batches: BTreeMap<u64, Batch>,
    fork_ids: Vec<ForkIdInterval>,
}

/// A stand-in for the remote executor: hands out flush ids and reports the durably stored one.
#[derive(Debug)]
struct Executor {
    prover_id: String,
    last_flush_id: u64,
    stored_flush_id: u64,
    auto_flush: bool,
}

/// A [`StateStore`] kept in memory.
///
/// Transactions work on a copy of the committed data which replaces it on commit. Batch
/// execution is simulated: every processed batch gets the next flush id and, with auto flush
/// enabled, is reported as durably stored right away.
#[derive(Debug, Clone)]
pub struct InMemoryState {
    data: Arc<Mutex<StateData>>,
    executor: Arc<Mutex<Executor>>,
    failing_commits: Arc<Mutex<usize>>,
}

impl Default for InMemoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryState {
    /// Returns an empty [`InMemoryState`] with auto flush enabled.
    pub fn new() -> Self {
        Self {
            data: Default::default(),
            executor: Arc::new(Mutex::new(Executor {
                prover_id: DEFAULT_PROVER_ID.to_string(),
                last_flush_id: 0,
                stored_flush_id: 0,
                auto_flush: true,
            })),
            failing_commits: Default::default(),
        }
    }

    /// Seeds the fork id intervals.
    pub fn with_fork_ids(self, fork_ids: Vec<ForkIdInterval>) -> Self {
        self.data.lock().fork_ids = fork_ids;
        self
    }

    /// Enables or disables the immediate flush of processed batches.
    pub fn set_auto_flush(&self, auto_flush: bool) {
        self.executor.lock().auto_flush = auto_flush;
    }

    /// Sets the flush id reported as durably stored.
    pub fn set_stored_flush_id(&self, flush_id: u64) {
        tracing::trace!(target: "l1_sync::state", flush_id, "setting stored flush id");
        self.executor.lock().stored_flush_id = flush_id;
    }

    /// Sets the identity of the executor, as if it restarted.
    pub fn set_prover_id(&self, prover_id: impl Into<String>) {
        self.executor.lock().prover_id = prover_id.into();
    }

    /// Returns the last flush id handed out by the executor.
    pub fn last_flush_id(&self) -> u64 {
        self.executor.lock().last_flush_id
    }

    /// Makes the next `count` commits fail.
    pub fn fail_next_commits(&self, count: usize) {
        *self.failing_commits.lock() = count;
    }

    /// Returns the stored L1 blocks in ascending order.
    pub fn blocks(&self) -> Vec<L1BlockHeader> {
        self.data.lock().blocks.values().copied().collect()
    }

    /// Returns the stored global exit roots.
    pub fn global_exit_roots(&self) -> Vec<GlobalExitRoot> {
        self.data.lock().global_exit_roots.clone()
    }

    /// Returns the stored L1 info tree leaves.
    pub fn l1_info_tree(&self) -> Vec<L1InfoTreeLeaf> {
        self.data.lock().l1_info_tree.clone()
    }

    /// Returns the forced batch with the provided number.
    pub fn forced_batch(&self, forced_batch_number: u64) -> Option<ForcedBatch> {
        self.data.lock().forced_batches.get(&forced_batch_number).cloned()
    }

    /// Returns the virtual batch with the provided number.
    pub fn virtual_batch(&self, batch_number: u64) -> Option<VirtualBatch> {
        self.data.lock().virtual_batches.get(&batch_number).cloned()
    }

    /// Returns the verified batch with the provided number.
    pub fn verified_batch(&self, batch_number: u64) -> Option<VerifiedBatch> {
        self.data.lock().verified_batches.get(&batch_number).copied()
    }

    /// Returns the stored sequences with the block they were sequenced at.
    pub fn sequences(&self) -> Vec<(BatchSequence, u64)> {
        self.data.lock().sequences.clone()
    }

    /// Returns the fork id intervals.
    pub fn fork_ids(&self) -> Vec<ForkIdInterval> {
        self.data.lock().fork_ids.clone()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryState {
    type Tx = InMemoryStateTx;

    async fn begin_state_transaction(&self) -> Result<Self::Tx, StateError> {
        tracing::trace!(target: "l1_sync::state", "beginning transaction");
        Ok(InMemoryStateTx {
            working: self.data.lock().clone(),
            state: self.clone(),
        })
    }

    async fn get_last_block(&self) -> Result<Option<L1BlockHeader>, StateError> {
        Ok(self.data.lock().blocks.values().next_back().copied())
    }

    async fn get_previous_block(&self, offset: u64) -> Result<Option<L1BlockHeader>, StateError> {
        Ok(self.data.lock().blocks.values().rev().nth(offset as usize).copied())
    }

    async fn get_stored_flush_id(&self) -> Result<StoredFlushId, StateError> {
        let executor = self.executor.lock();
        Ok(StoredFlushId {
            flush_id: executor.stored_flush_id,
            prover_id: executor.prover_id.clone(),
        })
    }

    async fn get_batch_by_number(&self, batch_number: u64) -> Result<Option<Batch>, StateError> {
        Ok(self.data.lock().batches.get(&batch_number).cloned())
    }

    async fn get_batch_l2_data(&self, batch_number: u64) -> Result<Option<Bytes>, StateError> {
        Ok(self.data.lock().batches.get(&batch_number).map(|b| b.batch_l2_data.clone()))
    }

    async fn get_last_batch_number(&self) -> Result<u64, StateError> {
        Ok(self.data.lock().batches.keys().next_back().copied().unwrap_or_default())
    }

    async fn reset(&self, block_number: u64) -> Result<(), StateError> {
        tracing::info!(target: "l1_sync::state", block_number, "resetting state");
        let mut data = self.data.lock();
        data.blocks.retain(|n, _| *n <= block_number);
        data.global_exit_roots.retain(|g| g.block_number <= block_number);
        data.l1_info_tree.retain(|l| l.global_exit_root.block_number <= block_number);
        data.forced_batches.retain(|_, f| f.block_number <= block_number);
        data.sequences.retain(|(_, b)| *b <= block_number);
        data.virtual_batches.retain(|_, v| v.block_number <= block_number);
        data.verified_batches.retain(|_, v| v.block_number <= block_number);
        data.fork_ids.retain(|f| f.block_number <= block_number);
        if let Some(last) = data.fork_ids.last_mut() {
            last.to_batch_number = u64::MAX;
        }
        Ok(())
    }

    async fn reset_trusted_state(&self, batch_number: u64) -> Result<(), StateError> {
        tracing::info!(target: "l1_sync::state", batch_number, "resetting trusted state");
        self.data.lock().batches.retain(|n, _| *n <= batch_number);
        Ok(())
    }

    fn fork_id_by_batch_number(&self, batch_number: u64) -> u64 {
        let data = self.data.lock();
        data.fork_ids
            .iter()
            .find(|f| f.contains_batch(batch_number))
            .or_else(|| data.fork_ids.last())
            .map(|f| f.fork_id)
            .unwrap_or_default()
    }

    fn fork_id_by_block_number(&self, block_number: u64) -> u64 {
        let data = self.data.lock();
        data.fork_ids
            .iter()
            .rev()
            .find(|f| f.block_number <= block_number)
            .or_else(|| data.fork_ids.first())
            .map(|f| f.fork_id)
            .unwrap_or_default()
    }
}

/// The write transaction of the [`InMemoryState`].
#[derive(Debug)]
pub struct InMemoryStateTx {
    state: InMemoryState,
    working: StateData,
}

#[async_trait::async_trait]
impl StateTx for InMemoryStateTx {
    async fn add_block(&mut self, header: &L1BlockHeader) -> Result<(), StateError> {
        if let Some((last, _)) = self.working.blocks.last_key_value() {
            if *last >= header.number {
                return Err(StateError::BlockOutOfOrder { number: header.number, last: *last });
            }
        }
        self.working.blocks.insert(header.number, *header);
        Ok(())
    }

    async fn add_global_exit_root(&mut self, ger: &GlobalExitRoot) -> Result<(), StateError> {
        self.working.global_exit_roots.push(*ger);
        Ok(())
    }

    async fn add_l1_info_tree_leaf(&mut self, leaf: &L1InfoTreeLeaf) -> Result<u64, StateError> {
        self.working.l1_info_tree.push(*leaf);
        Ok(self.working.l1_info_tree.len() as u64 - 1)
    }

    async fn add_forced_batch(&mut self, batch: &ForcedBatch) -> Result<(), StateError> {
        self.working.forced_batches.insert(batch.forced_batch_number, batch.clone());
        Ok(())
    }

    async fn add_sequence(
        &mut self,
        sequence: &BatchSequence,
        block_number: u64,
    ) -> Result<(), StateError> {
        self.working.sequences.push((*sequence, block_number));
        Ok(())
    }

    async fn add_virtual_batch(&mut self, batch: &VirtualBatch) -> Result<(), StateError> {
        self.working.virtual_batches.insert(batch.batch_number, batch.clone());
        Ok(())
    }

    async fn add_verified_batch(&mut self, batch: &VerifiedBatch) -> Result<(), StateError> {
        self.working.verified_batches.insert(batch.batch_number, *batch);
        Ok(())
    }

    async fn add_fork_id_interval(&mut self, interval: &ForkIdInterval) -> Result<(), StateError> {
        let fork_ids = &mut self.working.fork_ids;
        match fork_ids.last_mut() {
            Some(last) if last.from_batch_number == interval.from_batch_number => {
                *last = interval.clone();
            }
            Some(last) => {
                last.to_batch_number = interval.from_batch_number.saturating_sub(1);
                fork_ids.push(interval.clone());
            }
            None => fork_ids.push(interval.clone()),
        }
        Ok(())
    }

    async fn update_batch_l2_data(
        &mut self,
        batch_number: u64,
        data: &Bytes,
    ) -> Result<(), StateError> {
        let batch = self.working.batches.entry(batch_number).or_insert_with(|| Batch {
            batch_number,
            closed: true,
            ..Default::default()
        });
        batch.batch_l2_data = data.clone();
        Ok(())
    }

    async fn open_batch(&mut self, batch: &Batch) -> Result<(), StateError> {
        if self.working.batches.get(&batch.batch_number).is_some_and(|b| b.closed) {
            return Err(StateError::BatchClosed(batch.batch_number));
        }
        self.working.batches.insert(batch.batch_number, Batch { closed: false, ..batch.clone() });
        Ok(())
    }

    async fn process_batch(
        &mut self,
        request: &ProcessBatchRequest,
    ) -> Result<ProcessBatchResponse, StateError> {
        let previous_root = self
            .working
            .batches
            .range(..request.batch_number)
            .next_back()
            .map(|(_, b)| b.state_root)
            .unwrap_or(B256::ZERO);
        let batch = self
            .working
            .batches
            .get_mut(&request.batch_number)
            .ok_or(StateError::BatchNotFound(request.batch_number))?;
        if batch.closed {
            return Err(StateError::BatchClosed(request.batch_number));
        }

        let new_state_root =
            keccak256([previous_root.as_slice(), keccak256(&request.transactions).as_slice()].concat());
        batch.batch_l2_data = request.transactions.clone();
        batch.state_root = new_state_root;

        let mut executor = self.state.executor.lock();
        executor.last_flush_id += 1;
        if executor.auto_flush {
            executor.stored_flush_id = executor.last_flush_id;
        }
        tracing::trace!(target: "l1_sync::state", batch_number = request.batch_number, flush_id = executor.last_flush_id, "processed batch");

        Ok(ProcessBatchResponse {
            new_state_root,
            flush_id: executor.last_flush_id,
            prover_id: executor.prover_id.clone(),
        })
    }

    async fn close_batch(&mut self, batch_number: u64) -> Result<(), StateError> {
        let batch = self
            .working
            .batches
            .get_mut(&batch_number)
            .ok_or(StateError::BatchNotFound(batch_number))?;
        batch.closed = true;
        Ok(())
    }

    async fn commit(self) -> Result<(), StateError> {
        tracing::trace!(target: "l1_sync::state", "committing transaction");
        {
            let mut failing = self.state.failing_commits.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(StateError::Commit("injected commit failure".to_string()));
            }
        }
        *self.state.data.lock() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StateError> {
        tracing::trace!(target: "l1_sync::state", "rolling back transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64) -> L1BlockHeader {
        L1BlockHeader::new(
            number,
            B256::with_last_byte(number as u8),
            B256::with_last_byte(number as u8 - 1),
            number,
        )
    }

    #[tokio::test]
    async fn test_commit_and_rollback() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();

        // When
        let mut tx = state.begin_state_transaction().await?;
        tx.add_block(&header(1)).await?;
        tx.commit().await?;

        let mut tx = state.begin_state_transaction().await?;
        tx.add_block(&header(2)).await?;
        tx.rollback().await?;

        // Then
        assert_eq!(state.get_last_block().await?, Some(header(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_should_reject_out_of_order_block() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let mut tx = state.begin_state_transaction().await?;
        tx.add_block(&header(5)).await?;

        // When
        let res = tx.add_block(&header(5)).await;

        // Then
        assert!(matches!(res, Err(StateError::BlockOutOfOrder { number: 5, last: 5 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_previous_block_and_reset() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let mut tx = state.begin_state_transaction().await?;
        for n in 1..=5 {
            tx.add_block(&header(n)).await?;
        }
        tx.commit().await?;

        // Then
        assert_eq!(state.get_previous_block(0).await?, Some(header(5)));
        assert_eq!(state.get_previous_block(2).await?, Some(header(3)));
        assert_eq!(state.get_previous_block(5).await?, None);

        // When
        state.reset(3).await?;

        // Then
        assert_eq!(state.get_last_block().await?, Some(header(3)));
        Ok(())
    }

    #[tokio::test]
    async fn test_process_batch_hands_out_flush_ids() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        state.set_auto_flush(false);
        let mut tx = state.begin_state_transaction().await?;
        tx.open_batch(&Batch { batch_number: 1, ..Default::default() }).await?;

        // When
        let response = tx
            .process_batch(&ProcessBatchRequest { batch_number: 1, ..Default::default() })
            .await?;
        tx.close_batch(1).await?;
        tx.commit().await?;

        // Then
        assert_eq!(response.flush_id, 1);
        assert_eq!(response.prover_id, DEFAULT_PROVER_ID);
        assert_eq!(state.get_stored_flush_id().await?.flush_id, 0);
        assert!(state.get_batch_by_number(1).await?.is_some_and(|b| b.closed));
        Ok(())
    }

    #[tokio::test]
    async fn test_fork_id_lookups() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new().with_fork_ids(vec![ForkIdInterval {
            from_batch_number: 0,
            to_batch_number: u64::MAX,
            fork_id: 6,
            version: "v6".to_string(),
            block_number: 0,
        }]);

        // When
        let mut tx = state.begin_state_transaction().await?;
        tx.add_fork_id_interval(&ForkIdInterval {
            from_batch_number: 101,
            to_batch_number: u64::MAX,
            fork_id: 7,
            version: "v7".to_string(),
            block_number: 50,
        })
        .await?;
        tx.commit().await?;

        // Then
        assert_eq!(state.fork_id_by_batch_number(100), 6);
        assert_eq!(state.fork_id_by_batch_number(101), 7);
        assert_eq!(state.fork_id_by_block_number(49), 6);
        assert_eq!(state.fork_id_by_block_number(50), 7);
        assert_eq!(state.fork_ids()[0].to_batch_number, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_commit_failure() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        state.fail_next_commits(1);

        // When
        let mut tx = state.begin_state_transaction().await?;
        tx.add_block(&header(1)).await?;
        let res = tx.commit().await;

        // Then
        assert!(matches!(res, Err(StateError::Commit(_))));
        assert_eq!(state.get_last_block().await?, None);
        Ok(())
    }
}
