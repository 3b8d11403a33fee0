use crate::{
    error::SynchronizerResult, BatchDataRetriever, BlockRangeProcessor, DataCommitteeClientFactory,
    FlushIdController, L1EventProcessorManager, Orchestrator, OrchestratorHandle, ProducerError,
    StateBlockRangeProcessor, StateEventProcessor, SynchronizerConfig, SynchronizerError,
    TrustedSequencerClient,
};
use l1_sync_etherman::EthermanClient;
use l1_sync_primitives::{EventOrder, ForkId, L1Block, L1BlockHeader, Order};
use l1_sync_state::StateStore;
use std::{collections::HashMap, fmt::Debug, future::Future, sync::Arc};

type Processor<S> = Arc<StateBlockRangeProcessor<S>>;

/// Keeps the state in sync with the rollup events emitted on L1.
#[derive(Debug)]
pub struct Synchronizer<S: StateStore, E> {
    config: SynchronizerConfig,
    state: S,
    etherman: Arc<E>,
    processor: Processor<S>,
    orchestrator: Orchestrator<E, Processor<S>>,
}

impl<S, E> Synchronizer<S, E>
where
    S: StateStore + Clone + Debug + 'static,
    E: EthermanClient + Debug + 'static,
{
    /// Returns a new [`Synchronizer`] using a producer worker per L1 client. The first client is
    /// also used for the genesis and reorg checks.
    pub fn new(
        config: SynchronizerConfig,
        state: S,
        ethermans: Vec<Arc<E>>,
        trusted_sequencer: Option<Arc<dyn TrustedSequencerClient>>,
        committee_clients: Arc<dyn DataCommitteeClientFactory>,
    ) -> SynchronizerResult<Self> {
        let etherman = ethermans
            .first()
            .cloned()
            .ok_or(ProducerError::InvalidConfig("at least one L1 client is required"))?;

        let flush_id = Arc::new(FlushIdController::new(state.clone()));
        let batch_data = Arc::new(BatchDataRetriever::new(
            state.clone(),
            etherman.clone(),
            config.is_trusted_sequencer,
            trusted_sequencer,
            committee_clients,
        ));
        let mut processors = L1EventProcessorManager::new();
        processors
            .register(Arc::new(StateEventProcessor::new(
                state.clone(),
                config.fork_ids.clone(),
                flush_id.clone(),
                batch_data,
            )))
            .map_err(|err| {
                tracing::error!(target: "l1_sync::synchronizer", %err, "failed to register event processors");
                ProducerError::InvalidConfig("duplicated fork ids")
            })?;
        let processor =
            Arc::new(StateBlockRangeProcessor::new(state.clone(), Arc::new(processors), flush_id));
        let orchestrator = Orchestrator::new(&config, ethermans, processor.clone())?;

        Ok(Self { config, state, etherman, processor, orchestrator })
    }

    /// Returns a handle to command the producer and the consumer.
    pub fn orchestrator_handle(&self) -> OrchestratorHandle {
        self.orchestrator.handle()
    }

    /// Synchronizes until the shutdown future resolves or a fatal error occurs.
    pub async fn sync<F: Future<Output = ()>>(&mut self, shutdown: F) -> SynchronizerResult<()> {
        tokio::pin!(shutdown);
        let mut last_block = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            res = self.initialize() => res?,
        };
        tracing::info!(target: "l1_sync::synchronizer", last_block = last_block.number, hash = %last_block.hash, "starting synchronization");

        let mut interval = tokio::time::interval(self.config.sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }

            let res = tokio::select! {
                _ = &mut shutdown => break,
                res = self.sync_cycle(last_block) => res,
            };
            match res {
                Ok(block) => last_block = block,
                Err(SynchronizerError::Orchestrator(err)) if !err.is_fatal() => {
                    tracing::warn!(target: "l1_sync::synchronizer", %err, "synchronization cycle failed, restarting from the state");
                    last_block = self.reload_last_block().await?;
                }
                Err(err) => {
                    tracing::error!(target: "l1_sync::synchronizer", %err, "fatal synchronization error");
                    self.orchestrator.abort();
                    return Err(err);
                }
            }
        }

        tracing::info!(target: "l1_sync::synchronizer", last_block = last_block.number, "synchronizer shutting down");
        self.orchestrator.abort();
        Ok(())
    }

    /// Returns the last block of the state, storing the genesis block if the state is empty.
    async fn initialize(&self) -> SynchronizerResult<L1BlockHeader> {
        if let Some(last_block) = self.state.get_last_block().await? {
            return Ok(last_block);
        }

        let genesis = self.config.genesis_block_number;
        tracing::info!(target: "l1_sync::synchronizer", genesis, "state is empty, storing genesis block");
        if !self.etherman.verify_gen_block_number(genesis).await? {
            return Err(SynchronizerError::InvalidGenesisBlock(genesis));
        }
        let header = self.etherman.eth_block_by_number(genesis).await?;

        let mut block = L1Block::new(header);
        let mut orders = Vec::new();
        for fork in self.etherman.get_forks(genesis, genesis).await? {
            tracing::debug!(target: "l1_sync::synchronizer", fork_id = fork.fork_id, version = fork.version, "genesis fork id");
            orders.push(Order::new(EventOrder::ForkIds, block.fork_ids.len()));
            block.fork_ids.push(ForkId {
                batch_number: fork.from_batch_number.saturating_sub(1),
                fork_id: fork.fork_id,
                version: fork.version,
            });
        }
        self.processor.process_block_range(&[block], &HashMap::from([(header.hash, orders)])).await?;

        self.state.get_last_block().await?.ok_or(SynchronizerError::MissingLastBlock)
    }

    async fn sync_cycle(&mut self, last_block: L1BlockHeader) -> SynchronizerResult<L1BlockHeader> {
        if let Some(block) = self.check_reorg(last_block).await? {
            tracing::warn!(target: "l1_sync::synchronizer", from = last_block.number, to = block.number, "L1 reorg, resetting state");
            self.state.reset(block.number).await?;
            self.orchestrator.reset(block.number);
            return Ok(block);
        }
        Ok(self.orchestrator.start(last_block).await?)
    }

    /// Returns the last stored block still on the L1 canonical chain if `last_block` was
    /// reorganized, `None` otherwise.
    async fn check_reorg(
        &self,
        last_block: L1BlockHeader,
    ) -> SynchronizerResult<Option<L1BlockHeader>> {
        let on_l1 = self.etherman.eth_block_by_number(last_block.number).await?;
        if on_l1.matches(&last_block) {
            tracing::trace!(target: "l1_sync::synchronizer", block_number = last_block.number, "no reorg");
            return Ok(None);
        }
        tracing::warn!(target: "l1_sync::synchronizer", block_number = last_block.number, stored = %last_block.hash, l1 = %on_l1.hash, "stored block differs from L1");

        let mut depth = 1;
        let mut checked = last_block.number;
        loop {
            let Some(stored) = self.state.get_previous_block(depth).await? else {
                return Err(SynchronizerError::ReorgBeyondStoredBlocks(checked));
            };
            let on_l1 = self.etherman.eth_block_by_number(stored.number).await?;
            if on_l1.matches(&stored) {
                return Ok(Some(stored));
            }
            tracing::debug!(target: "l1_sync::synchronizer", block_number = stored.number, depth, "stored block reorganized");
            checked = stored.number;
            depth += 1;
        }
    }

    async fn reload_last_block(&mut self) -> SynchronizerResult<L1BlockHeader> {
        let last_block =
            self.state.get_last_block().await?.ok_or(SynchronizerError::MissingLastBlock)?;
        self.orchestrator.reset(last_block.number);
        Ok(last_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        random, test_utils::Arbitrary, BatchDataError, DataCommitteeClient, ProducerConfig,
    };
    use alloy_primitives::B256;
    use l1_sync_etherman::test_utils::{mock_header, MockEtherman};
    use l1_sync_primitives::{ForkIdInterval, GlobalExitRoot};
    use l1_sync_state::InMemoryState;
    use std::time::Duration;
    use tokio::{sync::oneshot, task::JoinHandle};

    #[derive(Debug)]
    struct NoCommittee;

    impl DataCommitteeClientFactory for NoCommittee {
        fn new_client(&self, url: &str) -> Result<Arc<dyn DataCommitteeClient>, BatchDataError> {
            Err(BatchDataError::InvalidUrl(url.to_string()))
        }
    }

    const GENESIS: u64 = 5;

    fn etherman(head: u64) -> Arc<MockEtherman> {
        let etherman = Arc::new(MockEtherman::new(head));
        etherman.set_genesis_block_number(GENESIS);
        etherman.set_forks(vec![ForkIdInterval {
            from_batch_number: 1,
            to_batch_number: u64::MAX,
            fork_id: 9,
            version: "v9".to_string(),
            block_number: GENESIS,
        }]);
        let mut block = L1Block::new(mock_header(15));
        block.global_exit_roots.push(GlobalExitRoot::new(15, B256::repeat_byte(1), B256::ZERO));
        etherman.add_block(block, vec![Order::new(EventOrder::GlobalExitRoots, 0)]);
        etherman
    }

    fn synchronizer(
        state: &InMemoryState,
        etherman: Arc<MockEtherman>,
    ) -> eyre::Result<Synchronizer<InMemoryState, MockEtherman>> {
        let config = SynchronizerConfig {
            sync_interval: Duration::from_millis(10),
            genesis_block_number: GENESIS,
            producer: ProducerConfig::default()
                .with_sync_chunk_size(9)
                .with_ttl_of_last_block_on_l1(Some(Duration::from_millis(20)))
                .with_time_out_main_loop(Duration::from_millis(50))
                .with_min_time_between_retries_for_rollup_info(Duration::from_millis(10)),
            ..Default::default()
        };
        Ok(Synchronizer::new(config, state.clone(), vec![etherman], None, Arc::new(NoCommittee))?)
    }

    fn spawn(
        mut synchronizer: Synchronizer<InMemoryState, MockEtherman>,
    ) -> (oneshot::Sender<()>, JoinHandle<SynchronizerResult<()>>) {
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            synchronizer
                .sync(async move {
                    let _ = rx.await;
                })
                .await
        });
        (tx, task)
    }

    async fn wait_for_last_block(state: &InMemoryState, header: L1BlockHeader) -> eyre::Result<()> {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.blocks().last() != Some(&header) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stores_genesis_and_synchronizes() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let synchronizer = synchronizer(&state, etherman(30))?;

        // When
        let (shutdown, task) = spawn(synchronizer);
        wait_for_last_block(&state, mock_header(30)).await?;
        let _ = shutdown.send(());
        task.await??;

        // Then
        let blocks = state.blocks();
        assert_eq!(blocks.first(), Some(&mock_header(GENESIS)));
        assert!(blocks.contains(&mock_header(15)));
        assert_eq!(state.global_exit_roots().len(), 1);
        assert_eq!(state.fork_ids().len(), 1);
        assert_eq!(state.fork_ids()[0].fork_id, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_genesis_is_fatal() -> eyre::Result<()> {
        let state = InMemoryState::new();
        let etherman = etherman(30);
        etherman.set_genesis_block_number(GENESIS + 1);
        let (_shutdown, task) = spawn(synchronizer(&state, etherman)?);

        let res = tokio::time::timeout(Duration::from_secs(5), task).await??;

        assert!(matches!(res, Err(SynchronizerError::InvalidGenesisBlock(GENESIS))));
        assert!(state.blocks().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_reorg_resets_to_last_common_block() -> eyre::Result<()> {
        // Given
        let state = InMemoryState::new();
        let etherman = etherman(30);
        let (shutdown, task) = spawn(synchronizer(&state, etherman.clone())?);
        wait_for_last_block(&state, mock_header(30)).await?;
        let _ = shutdown.send(());
        task.await??;

        // When
        let reorged = L1BlockHeader { number: 30, parent_hash: mock_header(29).hash, ..random!(L1BlockHeader) };
        etherman.set_header(reorged);
        let (shutdown, task) = spawn(synchronizer(&state, etherman)?);
        wait_for_last_block(&state, reorged).await?;
        let _ = shutdown.send(());
        task.await??;

        // Then
        let blocks = state.blocks();
        assert!(!blocks.contains(&mock_header(30)));
        assert!(blocks.contains(&mock_header(15)));
        assert_eq!(state.global_exit_roots().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_l1_client_list_is_rejected() {
        let res = Synchronizer::<InMemoryState, MockEtherman>::new(
            SynchronizerConfig::default(),
            InMemoryState::new(),
            vec![],
            None,
            Arc::new(NoCommittee),
        );
        assert!(matches!(res, Err(SynchronizerError::Producer(ProducerError::InvalidConfig(_)))));
    }

    #[tokio::test]
    async fn test_synchronizer_is_debug() -> eyre::Result<()> {
        let synchronizer = synchronizer(&InMemoryState::new(), etherman(30))?;
        let formatted = format!("{synchronizer:?}");
        assert!(formatted.starts_with("Synchronizer"));
        assert!(formatted.contains("StateBlockRangeProcessor"));
        Ok(())
    }
}
