use super::L1EventProcessorManager;
use crate::{BlockRangeProcessError, FlushIdController};
use l1_sync_primitives::{BlockOrders, L1Block, Order};
use l1_sync_state::{StateStore, StateTx};
use std::{fmt::Debug, sync::Arc};

/// Applies the rollup information of a range of L1 blocks to the state.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait BlockRangeProcessor: Send + Sync {
    /// Stores the blocks and applies their events in emission order.
    async fn process_block_range(
        &self,
        blocks: &[L1Block],
        orders: &BlockOrders,
    ) -> Result<(), BlockRangeProcessError>;
}

/// A [`BlockRangeProcessor`] writing each block in its own state transaction.
#[derive(Debug)]
pub struct StateBlockRangeProcessor<S: StateStore> {
    state: S,
    processors: Arc<L1EventProcessorManager<S::Tx>>,
    flush_id: Arc<FlushIdController<S>>,
}

impl<S: StateStore> StateBlockRangeProcessor<S> {
    /// Returns a new [`StateBlockRangeProcessor`].
    pub const fn new(
        state: S,
        processors: Arc<L1EventProcessorManager<S::Tx>>,
        flush_id: Arc<FlushIdController<S>>,
    ) -> Self {
        Self { state, processors, flush_id }
    }

    async fn process_block(
        &self,
        block: &L1Block,
        orders: &[Order],
        tx: &mut S::Tx,
    ) -> Result<(), BlockRangeProcessError> {
        tx.add_block(&block.header).await?;
        for order in orders {
            let fork_id = match block.sequence_for_order(order) {
                Some(sequence) => self.state.fork_id_by_batch_number(sequence.from_batch_number),
                None => self.state.fork_id_by_block_number(block.number()),
            };
            tracing::trace!(target: "l1_sync::processor", event = %order.name, block_number = block.number(), fork_id, "dispatching event");
            self.processors.process(fork_id, *order, block, tx).await.map_err(|error| {
                BlockRangeProcessError::Processor { block_number: block.number(), error }
            })?;
        }
        tracing::trace!(target: "l1_sync::processor", block_number = block.number(), "checking flush id before commit");
        self.flush_id.check_flush_id().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S> BlockRangeProcessor for StateBlockRangeProcessor<S>
where
    S: StateStore + Debug,
{
    async fn process_block_range(
        &self,
        blocks: &[L1Block],
        orders: &BlockOrders,
    ) -> Result<(), BlockRangeProcessError> {
        for block in blocks {
            let mut tx = self.state.begin_state_transaction().await?;
            let block_orders = orders.get(&block.hash()).map(Vec::as_slice).unwrap_or_default();
            if let Err(err) = self.process_block(block, block_orders, &mut tx).await {
                tracing::error!(target: "l1_sync::processor", block_number = block.number(), %err, "failed to process block");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(target: "l1_sync::processor", block_number = block.number(), %rollback_err, "failed to roll back state transaction");
                }
                return Err(err);
            }
            tx.commit().await.inspect_err(|err| {
                tracing::error!(target: "l1_sync::processor", block_number = block.number(), %err, "failed to commit state transaction")
            })?;
            tracing::debug!(target: "l1_sync::processor", block_number = block.number(), events = block_orders.len(), "processed block");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchDataError, BatchDataProvider, ProcessorError, StateEventProcessor};
    use alloy_primitives::{Bytes, B256};
    use l1_sync_etherman::test_utils::mock_header;
    use l1_sync_primitives::{EventOrder, GlobalExitRoot, SequencedBatch};
    use l1_sync_state::{InMemoryState, StateError};
    use std::{collections::HashMap, time::Duration};

    #[derive(Debug)]
    struct NoBatchData;

    #[async_trait::async_trait]
    impl BatchDataProvider for NoBatchData {
        async fn get_batch_l2_data(
            &self,
            batch_number: u64,
            _expected_hash: B256,
        ) -> Result<Bytes, BatchDataError> {
            Err(BatchDataError::NotFound { batch_number, tried: vec![] })
        }
    }

    fn processor(state: &InMemoryState) -> eyre::Result<StateBlockRangeProcessor<InMemoryState>> {
        let flush_id = Arc::new(FlushIdController::new(state.clone()));
        let mut manager = L1EventProcessorManager::new();
        manager.register(Arc::new(StateEventProcessor::new(
            state.clone(),
            vec![0],
            flush_id.clone(),
            Arc::new(NoBatchData),
        )))?;
        Ok(StateBlockRangeProcessor::new(state.clone(), Arc::new(manager), flush_id))
    }

    fn block_with_ger(number: u64) -> (L1Block, Vec<Order>) {
        let mut block = L1Block::new(mock_header(number));
        block.global_exit_roots.push(GlobalExitRoot::new(number, B256::repeat_byte(1), B256::ZERO));
        (block, vec![Order::new(EventOrder::GlobalExitRoots, 0)])
    }

    #[tokio::test]
    async fn test_each_block_is_committed() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let processor = processor(&state)?;
        let (first, first_orders) = block_with_ger(10);
        let second = L1Block::new(mock_header(12));
        let orders = HashMap::from([(first.hash(), first_orders)]);

        // When
        processor.process_block_range(&[first, second], &orders).await?;

        // Then
        assert_eq!(state.blocks(), vec![mock_header(10), mock_header(12)]);
        assert_eq!(state.global_exit_roots().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_block_is_rolled_back() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let processor = processor(&state)?;
        let (first, first_orders) = block_with_ger(10);
        let mut second = L1Block::new(mock_header(11));
        second.global_exit_roots.push(GlobalExitRoot::default());
        second.sequenced_batches.push(vec![SequencedBatch { batch_number: 1, ..Default::default() }]);
        let orders = HashMap::from([
            (first.hash(), first_orders),
            (
                second.hash(),
                vec![
                    Order::new(EventOrder::GlobalExitRoots, 0),
                    Order::new(EventOrder::SequenceBatches, 0),
                ],
            ),
        ]);

        // When
        let res = processor.process_block_range(&[first, second], &orders).await;

        // Then
        assert!(matches!(
            res,
            Err(BlockRangeProcessError::Processor {
                block_number: 11,
                error: ProcessorError::BatchData(BatchDataError::NotFound { batch_number: 1, .. })
            })
        ));
        assert_eq!(state.blocks(), vec![mock_header(10)]);
        assert_eq!(state.global_exit_roots().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_failure_is_propagated() -> eyre::Result<()> {
        let state = InMemoryState::new();
        let processor = processor(&state)?;
        state.fail_next_commits(1);

        let res = processor
            .process_block_range(&[L1Block::new(mock_header(3))], &Default::default())
            .await;

        assert!(matches!(res, Err(BlockRangeProcessError::State(StateError::Commit(_)))));
        assert!(state.blocks().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_waits_for_flush_id() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        state.set_auto_flush(false);
        let processor = Arc::new(processor(&state)?);
        let mut block = L1Block::new(mock_header(7));
        block.sequenced_batches.push(vec![SequencedBatch {
            batch_number: 1,
            batch_l2_data: Some(Bytes::from_static(b"txs")),
            ..Default::default()
        }]);
        let orders = HashMap::from([(block.hash(), vec![Order::new(EventOrder::SequenceBatches, 0)])]);

        // When
        let task = tokio::spawn({
            let processor = processor.clone();
            async move { processor.process_block_range(&[block], &orders).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let blocked = state.blocks().is_empty() && !task.is_finished();
        state.set_stored_flush_id(1);
        tokio::time::timeout(Duration::from_secs(5), task).await???;

        // Then
        assert!(blocked);
        assert_eq!(state.blocks(), vec![mock_header(7)]);
        Ok(())
    }
}
