//! Application of the decoded L1 events to the state.

use crate::ProcessorError;
use l1_sync_primitives::{EventOrder, L1Block, Order};
use l1_sync_state::StateTx;
use std::{collections::HashMap, fmt, sync::Arc};

mod block_range;
pub use block_range::{BlockRangeProcessor, StateBlockRangeProcessor};

mod state_events;
pub use state_events::StateEventProcessor;

/// Applies one kind of L1 event to the state, for a set of fork ids.
#[async_trait::async_trait]
pub trait L1EventProcessor<T: StateTx>: Send + Sync {
    /// The name used in logs.
    fn name(&self) -> &'static str;

    /// The fork ids the processor handles.
    fn supported_fork_ids(&self) -> Vec<u64>;

    /// The events the processor handles.
    fn supported_events(&self) -> Vec<EventOrder>;

    /// Applies the event `order` points at inside `block`.
    async fn process(
        &self,
        fork_id: u64,
        order: Order,
        block: &L1Block,
        tx: &mut T,
    ) -> Result<(), ProcessorError>;
}

/// Dispatches each event to the processor registered for its fork id and kind.
pub struct L1EventProcessorManager<T> {
    processors: HashMap<(u64, EventOrder), Arc<dyn L1EventProcessor<T>>>,
}

impl<T> fmt::Debug for L1EventProcessorManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.processors.keys().collect::<Vec<_>>();
        keys.sort();
        f.debug_struct("L1EventProcessorManager").field("processors", &keys).finish()
    }
}

impl<T> Default for L1EventProcessorManager<T> {
    fn default() -> Self {
        Self { processors: HashMap::new() }
    }
}

impl<T: StateTx> L1EventProcessorManager<T> {
    /// Returns an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the processor for every pair of its fork ids and events.
    pub fn register(
        &mut self,
        processor: Arc<dyn L1EventProcessor<T>>,
    ) -> Result<(), ProcessorError> {
        let events = processor.supported_events();
        let keys = processor
            .supported_fork_ids()
            .into_iter()
            .flat_map(|fork_id| events.iter().map(move |event| (fork_id, *event)))
            .collect::<Vec<_>>();
        if let Some((fork_id, event)) = keys.iter().find(|k| self.processors.contains_key(k)) {
            return Err(ProcessorError::DuplicateProcessor { fork_id: *fork_id, event: *event });
        }
        for key in keys {
            self.processors.insert(key, processor.clone());
        }
        tracing::debug!(target: "l1_sync::processor", name = processor.name(), "registered event processor");
        Ok(())
    }

    /// Returns true if a processor handles the pair.
    pub fn is_registered(&self, fork_id: u64, event: EventOrder) -> bool {
        self.processors.contains_key(&(fork_id, event))
    }

    /// Applies the event with the processor registered for the fork id.
    pub async fn process(
        &self,
        fork_id: u64,
        order: Order,
        block: &L1Block,
        tx: &mut T,
    ) -> Result<(), ProcessorError> {
        let processor = self
            .processors
            .get(&(fork_id, order.name))
            .ok_or(ProcessorError::UnregisteredProcessor { fork_id, event: order.name })?;
        tracing::trace!(target: "l1_sync::processor", name = processor.name(), fork_id, event = %order.name, pos = order.pos, block_number = block.number(), "processing event");
        processor.process(fork_id, order, block, tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1_sync_primitives::{GlobalExitRoot, L1BlockHeader};
    use l1_sync_state::{InMemoryState, InMemoryStateTx, StateStore};

    struct CountingProcessor {
        fork_ids: Vec<u64>,
        calls: parking_lot::Mutex<Vec<(u64, Order)>>,
    }

    #[async_trait::async_trait]
    impl L1EventProcessor<InMemoryStateTx> for CountingProcessor {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supported_fork_ids(&self) -> Vec<u64> {
            self.fork_ids.clone()
        }

        fn supported_events(&self) -> Vec<EventOrder> {
            vec![EventOrder::GlobalExitRoots]
        }

        async fn process(
            &self,
            fork_id: u64,
            order: Order,
            _block: &L1Block,
            _tx: &mut InMemoryStateTx,
        ) -> Result<(), ProcessorError> {
            self.calls.lock().push((fork_id, order));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_fork_and_event() -> eyre::Result<()> {
        // Given
        let processor =
            Arc::new(CountingProcessor { fork_ids: vec![6, 7], calls: Default::default() });
        let mut manager = L1EventProcessorManager::new();
        manager.register(processor.clone())?;
        let state = InMemoryState::new();
        let mut tx = state.begin_state_transaction().await?;
        let mut block = L1Block::new(L1BlockHeader::default());
        block.global_exit_roots.push(GlobalExitRoot::default());
        let order = Order::new(EventOrder::GlobalExitRoots, 0);

        // When
        manager.process(7, order, &block, &mut tx).await?;
        let unregistered = manager.process(8, order, &block, &mut tx).await;

        // Then
        assert_eq!(*processor.calls.lock(), vec![(7, order)]);
        assert!(matches!(
            unregistered,
            Err(ProcessorError::UnregisteredProcessor { fork_id: 8, event: EventOrder::GlobalExitRoots })
        ));
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_is_rejected() -> eyre::Result<()> {
        let mut manager = L1EventProcessorManager::<InMemoryStateTx>::new();
        manager.register(Arc::new(CountingProcessor { fork_ids: vec![6], calls: Default::default() }))?;

        let res = manager
            .register(Arc::new(CountingProcessor { fork_ids: vec![5, 6], calls: Default::default() }));

        assert!(matches!(res, Err(ProcessorError::DuplicateProcessor { fork_id: 6, .. })));
        assert!(manager.is_registered(6, EventOrder::GlobalExitRoots));
        assert!(!manager.is_registered(5, EventOrder::GlobalExitRoots));
        Ok(())
    }
}
