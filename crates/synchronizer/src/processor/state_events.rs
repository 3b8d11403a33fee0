use super::L1EventProcessor;
use crate::{BatchDataProvider, FlushIdController, ProcessorError};
use alloy_primitives::{Address, Bytes, B256};
use l1_sync_primitives::{EventOrder, ForkIdInterval, L1Block, Order};
use l1_sync_state::{Batch, ProcessBatchRequest, StateStore, StateTx, VirtualBatch};
use std::{fmt, sync::Arc};

/// A batch to execute, as found in a sequencing event.
#[derive(Debug)]
struct SequencedBatchData {
    batch_number: u64,
    coinbase: Address,
    global_exit_root: B256,
    timestamp: u64,
    transactions: Bytes,
}

/// Records every decoded L1 event through the state transaction and executes the sequenced
/// batches, reporting the resulting flush ids to the [`FlushIdController`].
pub struct StateEventProcessor<S> {
    state: S,
    fork_ids: Vec<u64>,
    flush_id: Arc<FlushIdController<S>>,
    batch_data: Arc<dyn BatchDataProvider>,
}

impl<S> fmt::Debug for StateEventProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEventProcessor").field("fork_ids", &self.fork_ids).finish_non_exhaustive()
    }
}

impl<S: StateStore> StateEventProcessor<S> {
    /// Returns a new [`StateEventProcessor`] handling the provided fork ids.
    pub fn new(
        state: S,
        fork_ids: Vec<u64>,
        flush_id: Arc<FlushIdController<S>>,
        batch_data: Arc<dyn BatchDataProvider>,
    ) -> Self {
        Self { state, fork_ids, flush_id, batch_data }
    }

    async fn execute_batch(
        &self,
        batch: SequencedBatchData,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        let batch_number = batch.batch_number;
        if let Some(existing) = self.state.get_batch_by_number(batch_number).await? {
            if existing.closed && existing.batch_l2_data == batch.transactions {
                tracing::debug!(target: "l1_sync::processor", batch_number, "trusted batch matches L1");
                return Ok(());
            }
            if existing.closed {
                tracing::warn!(target: "l1_sync::processor", batch_number, "trusted batch differs from L1, keeping the L1 data");
                tx.update_batch_l2_data(batch_number, &batch.transactions).await?;
                return Ok(());
            }
        }

        tx.open_batch(&Batch {
            batch_number,
            coinbase: batch.coinbase,
            global_exit_root: batch.global_exit_root,
            timestamp: batch.timestamp,
            ..Default::default()
        })
        .await?;
        let response = tx
            .process_batch(&ProcessBatchRequest {
                batch_number,
                coinbase: batch.coinbase,
                transactions: batch.transactions,
                global_exit_root: batch.global_exit_root,
                timestamp: batch.timestamp,
            })
            .await?;
        tx.close_batch(batch_number).await?;
        tracing::debug!(target: "l1_sync::processor", batch_number, state_root = %response.new_state_root, flush_id = response.flush_id, "executed batch");
        self.flush_id.pending_flush_id(response.flush_id, &response.prover_id)?;
        Ok(())
    }

    async fn process_sequence_batches(
        &self,
        order: Order,
        block: &L1Block,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        let sequence = block.sequenced_batches.get(order.pos).ok_or_else(|| missing(order, block))?;
        for batch in sequence {
            let transactions = match &batch.batch_l2_data {
                Some(data) => data.clone(),
                None => {
                    self.batch_data
                        .get_batch_l2_data(batch.batch_number, batch.transactions_hash)
                        .await?
                }
            };
            tx.add_virtual_batch(&VirtualBatch {
                batch_number: batch.batch_number,
                tx_hash: batch.tx_hash,
                coinbase: batch.coinbase,
                sequencer: batch.sequencer,
                block_number: block.number(),
                l1_info_root: batch.l1_info_root,
            })
            .await?;
            let timestamp = match batch.forced_timestamp {
                0 => batch.max_sequence_timestamp.unwrap_or(block.header.timestamp),
                forced => forced,
            };
            self.execute_batch(
                SequencedBatchData {
                    batch_number: batch.batch_number,
                    coinbase: batch.coinbase,
                    global_exit_root: batch.forced_global_exit_root,
                    timestamp,
                    transactions,
                },
                tx,
            )
            .await?;
        }
        self.add_sequence(order, block, tx).await
    }

    async fn process_sequence_force_batches(
        &self,
        order: Order,
        block: &L1Block,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        let sequence =
            block.sequenced_force_batches.get(order.pos).ok_or_else(|| missing(order, block))?;
        for batch in sequence {
            tx.add_virtual_batch(&VirtualBatch {
                batch_number: batch.batch_number,
                tx_hash: batch.tx_hash,
                coinbase: batch.coinbase,
                sequencer: batch.coinbase,
                block_number: block.number(),
                l1_info_root: None,
            })
            .await?;
            self.execute_batch(
                SequencedBatchData {
                    batch_number: batch.batch_number,
                    coinbase: batch.coinbase,
                    global_exit_root: batch.forced_global_exit_root,
                    timestamp: batch.timestamp,
                    transactions: batch.transactions.clone(),
                },
                tx,
            )
            .await?;
        }
        self.add_sequence(order, block, tx).await
    }

    async fn process_update_etrog_sequence(
        &self,
        order: Order,
        block: &L1Block,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        let update = block.update_etrog_sequence.as_ref().ok_or_else(|| missing(order, block))?;
        tx.add_virtual_batch(&VirtualBatch {
            batch_number: update.batch_number,
            tx_hash: update.tx_hash,
            coinbase: update.sequencer,
            sequencer: update.sequencer,
            block_number: block.number(),
            l1_info_root: None,
        })
        .await?;
        self.execute_batch(
            SequencedBatchData {
                batch_number: update.batch_number,
                coinbase: update.sequencer,
                global_exit_root: update.forced_global_exit_root,
                timestamp: block.header.timestamp,
                transactions: update.transactions.clone(),
            },
            tx,
        )
        .await?;
        self.add_sequence(order, block, tx).await
    }

    async fn add_sequence(
        &self,
        order: Order,
        block: &L1Block,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        if let Some(sequence) = block.sequence_for_order(&order) {
            tx.add_sequence(&sequence, block.number()).await?;
        }
        Ok(())
    }
}

fn missing(order: Order, block: &L1Block) -> ProcessorError {
    ProcessorError::MissingEvent { block_number: block.number(), event: order.name, pos: order.pos }
}

#[async_trait::async_trait]
impl<S> L1EventProcessor<S::Tx> for StateEventProcessor<S>
where
    S: StateStore + 'static,
{
    fn name(&self) -> &'static str {
        "state_events"
    }

    fn supported_fork_ids(&self) -> Vec<u64> {
        self.fork_ids.clone()
    }

    fn supported_events(&self) -> Vec<EventOrder> {
        vec![
            EventOrder::GlobalExitRoots,
            EventOrder::L1InfoTree,
            EventOrder::SequenceBatches,
            EventOrder::UpdateEtrogSequence,
            EventOrder::ForcedBatches,
            EventOrder::TrustedVerifyBatch,
            EventOrder::VerifyBatch,
            EventOrder::SequenceForceBatches,
            EventOrder::ForkIds,
        ]
    }

    async fn process(
        &self,
        fork_id: u64,
        order: Order,
        block: &L1Block,
        tx: &mut S::Tx,
    ) -> Result<(), ProcessorError> {
        match order.name {
            EventOrder::GlobalExitRoots => {
                let ger = block.global_exit_roots.get(order.pos).ok_or_else(|| missing(order, block))?;
                tx.add_global_exit_root(ger).await?;
            }
            EventOrder::L1InfoTree => {
                let leaf = block.l1_info_tree.get(order.pos).ok_or_else(|| missing(order, block))?;
                let index = tx.add_l1_info_tree_leaf(leaf).await?;
                tracing::debug!(target: "l1_sync::processor", index, block_number = block.number(), "added L1 info tree leaf");
            }
            EventOrder::SequenceBatches => self.process_sequence_batches(order, block, tx).await?,
            EventOrder::UpdateEtrogSequence => {
                self.process_update_etrog_sequence(order, block, tx).await?
            }
            EventOrder::ForcedBatches => {
                let batch = block.forced_batches.get(order.pos).ok_or_else(|| missing(order, block))?;
                tx.add_forced_batch(batch).await?;
            }
            EventOrder::TrustedVerifyBatch | EventOrder::VerifyBatch => {
                let batch = block.verified_batches.get(order.pos).ok_or_else(|| missing(order, block))?;
                tx.add_verified_batch(batch).await?;
            }
            EventOrder::SequenceForceBatches => {
                self.process_sequence_force_batches(order, block, tx).await?
            }
            EventOrder::ForkIds => {
                let fork = block.fork_ids.get(order.pos).ok_or_else(|| missing(order, block))?;
                tracing::info!(target: "l1_sync::processor", current = fork_id, new = fork.fork_id, version = fork.version, batch_number = fork.batch_number, "fork id update");
                tx.add_fork_id_interval(&ForkIdInterval {
                    from_batch_number: fork.batch_number + 1,
                    to_batch_number: u64::MAX,
                    fork_id: fork.fork_id,
                    version: fork.version.clone(),
                    block_number: block.number(),
                })
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchDataError;
    use alloy_primitives::keccak256;
    use l1_sync_etherman::test_utils::mock_header;
    use l1_sync_primitives::{BatchSequence, ForkId, GlobalExitRoot, SequencedBatch, VerifiedBatch};
    use l1_sync_state::InMemoryState;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct MockBatchData {
        data: HashMap<u64, Bytes>,
        requests: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl BatchDataProvider for MockBatchData {
        async fn get_batch_l2_data(
            &self,
            batch_number: u64,
            _expected_hash: B256,
        ) -> Result<Bytes, BatchDataError> {
            self.requests.lock().push(batch_number);
            self.data
                .get(&batch_number)
                .cloned()
                .ok_or(BatchDataError::NotFound { batch_number, tried: vec![] })
        }
    }

    fn processor(
        state: &InMemoryState,
        batch_data: Arc<MockBatchData>,
    ) -> (StateEventProcessor<InMemoryState>, Arc<FlushIdController<InMemoryState>>) {
        let flush_id = Arc::new(FlushIdController::new(state.clone()));
        (StateEventProcessor::new(state.clone(), vec![9], flush_id.clone(), batch_data), flush_id)
    }

    #[tokio::test]
    async fn test_records_events() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let (processor, _) = processor(&state, Default::default());
        let mut block = L1Block::new(mock_header(20));
        block.global_exit_roots.push(GlobalExitRoot::new(20, B256::repeat_byte(1), B256::ZERO));
        block.verified_batches.push(VerifiedBatch { batch_number: 3, is_trusted: true, ..Default::default() });
        block.fork_ids.push(ForkId { batch_number: 10, fork_id: 9, version: "v9".to_string() });

        // When
        let mut tx = state.begin_state_transaction().await?;
        for order in [
            Order::new(EventOrder::GlobalExitRoots, 0),
            Order::new(EventOrder::TrustedVerifyBatch, 0),
            Order::new(EventOrder::ForkIds, 0),
        ] {
            processor.process(9, order, &block, &mut tx).await?;
        }
        tx.commit().await?;

        // Then
        assert_eq!(state.global_exit_roots().len(), 1);
        assert!(state.verified_batch(3).is_some());
        let forks = state.fork_ids();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].from_batch_number, 11);
        assert_eq!(forks[0].block_number, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_executes_batches_and_sets_pending_flush_id() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        state.set_auto_flush(false);
        let validium_data = Bytes::from_static(b"validium");
        let batch_data = Arc::new(MockBatchData {
            data: HashMap::from([(2, validium_data.clone())]),
            ..Default::default()
        });
        let (processor, flush_id) = processor(&state, batch_data.clone());
        let mut block = L1Block::new(mock_header(30));
        block.sequenced_batches.push(vec![
            SequencedBatch {
                batch_number: 1,
                batch_l2_data: Some(Bytes::from_static(b"rollup")),
                ..Default::default()
            },
            SequencedBatch {
                batch_number: 2,
                transactions_hash: keccak256(&validium_data),
                ..Default::default()
            },
        ]);

        // When
        let mut tx = state.begin_state_transaction().await?;
        processor.process(9, Order::new(EventOrder::SequenceBatches, 0), &block, &mut tx).await?;
        tx.commit().await?;

        // Then
        assert_eq!(*batch_data.requests.lock(), vec![2]);
        assert!(state.virtual_batch(1).is_some());
        assert!(state.virtual_batch(2).is_some());
        assert_eq!(state.get_batch_l2_data(2).await?, Some(validium_data));
        assert_eq!(
            state.sequences(),
            vec![(BatchSequence { from_batch_number: 1, to_batch_number: 2 }, 30)]
        );
        assert_eq!(state.last_flush_id(), 2);
        assert!(!flush_id.is_fulfilled());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_event_is_an_error() -> eyre::Result<()> {
        let state = InMemoryState::new();
        let (processor, _) = processor(&state, Default::default());
        let block = L1Block::new(mock_header(5));

        let mut tx = state.begin_state_transaction().await?;
        let res = processor.process(9, Order::new(EventOrder::ForcedBatches, 2), &block, &mut tx).await;

        assert!(matches!(
            res,
            Err(ProcessorError::MissingEvent { block_number: 5, event: EventOrder::ForcedBatches, pos: 2 })
        ));
        Ok(())
    }
}
