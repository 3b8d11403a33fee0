//! Integration tests of the L1 synchronization.
#![cfg(feature = "test-utils")]

use alloy_primitives::{keccak256, Address, Bytes, B256};
use l1_sync::{
    test_utils::RecordingBlockRangeProcessor, BatchDataError, DataCommitteeClient,
    DataCommitteeClientFactory, Orchestrator, ProducerConfig, Synchronizer, SynchronizerConfig,
    SynchronizerError,
};
use l1_sync_etherman::test_utils::{mock_header, MockEtherman};
use l1_sync_primitives::{
    DataCommittee, DataCommitteeMember, EventOrder, L1Block, L1BlockHeader, Order,
    SequencedBatch, VerifiedBatch,
};
use l1_sync_state::InMemoryState;
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle};

const GENESIS: u64 = 1;

#[derive(Debug)]
struct StaticMember(Bytes);

#[async_trait::async_trait]
impl DataCommitteeClient for StaticMember {
    async fn get_off_chain_data(&self, _hash: B256) -> Result<Bytes, BatchDataError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
struct StaticCommittee(Bytes);

impl DataCommitteeClientFactory for StaticCommittee {
    fn new_client(&self, _url: &str) -> Result<Arc<dyn DataCommitteeClient>, BatchDataError> {
        Ok(Arc::new(StaticMember(self.0.clone())))
    }
}

fn producer_config() -> ProducerConfig {
    ProducerConfig::default()
        .with_sync_chunk_size(9)
        .with_ttl_of_last_block_on_l1(Some(Duration::from_millis(20)))
        .with_time_out_main_loop(Duration::from_millis(50))
        .with_min_time_between_retries_for_rollup_info(Duration::from_millis(10))
}

fn spawn(
    mut synchronizer: Synchronizer<InMemoryState, MockEtherman>,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), SynchronizerError>>) {
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
    tokio::time::timeout(Duration::from_secs(10), async {
        while state.blocks().last() != Some(&header) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_validium_sequence_is_executed_and_verified() -> eyre::Result<()> {
    // Given
    let data = Bytes::from_static(b"validium batch");
    let etherman = Arc::new(MockEtherman::new(60));
    etherman.set_genesis_block_number(GENESIS);
    etherman.set_data_committee(DataCommittee {
        members: vec![DataCommitteeMember {
            addr: Address::repeat_byte(1),
            url: "http://dac-0".to_string(),
        }],
        ..Default::default()
    });

    let mut sequence_block = L1Block::new(mock_header(20));
    sequence_block.sequenced_batches.push(vec![SequencedBatch {
        batch_number: 1,
        transactions_hash: keccak256(&data),
        ..Default::default()
    }]);
    etherman.add_block(sequence_block, vec![Order::new(EventOrder::SequenceBatches, 0)]);

    let mut verify_block = L1Block::new(mock_header(40));
    verify_block.verified_batches.push(VerifiedBatch {
        block_number: 40,
        batch_number: 1,
        is_trusted: true,
        ..Default::default()
    });
    etherman.add_block(verify_block, vec![Order::new(EventOrder::TrustedVerifyBatch, 0)]);

    let state = InMemoryState::new();
    let config = SynchronizerConfig {
        sync_interval: Duration::from_millis(10),
        genesis_block_number: GENESIS,
        is_trusted_sequencer: true,
        producer: producer_config(),
        ..Default::default()
    };
    let synchronizer = Synchronizer::new(
        config,
        state.clone(),
        vec![etherman.clone(), etherman.clone(), etherman],
        None,
        Arc::new(StaticCommittee(data.clone())),
    )?;

    // When
    let (shutdown, task) = spawn(synchronizer);
    wait_for_last_block(&state, mock_header(60)).await?;
    let _ = shutdown.send(());
    task.await??;

    // Then
    let virtual_batch = state.virtual_batch(1).ok_or_else(|| eyre::eyre!("missing batch"))?;
    assert_eq!(virtual_batch.block_number, 20);
    assert_eq!(state.verified_batch(1).map(|b| b.block_number), Some(40));
    assert_eq!(state.sequences().len(), 1);
    let blocks = state.blocks();
    assert!(blocks.windows(2).all(|w| w[0].number < w[1].number));
    Ok(())
}

#[tokio::test]
async fn test_state_waits_for_the_executor_to_flush() -> eyre::Result<()> {
    // Given
    let etherman = Arc::new(MockEtherman::new(30));
    etherman.set_genesis_block_number(GENESIS);
    let mut block = L1Block::new(mock_header(15));
    block.sequenced_batches.push(vec![SequencedBatch {
        batch_number: 1,
        batch_l2_data: Some(Bytes::from_static(b"rollup batch")),
        ..Default::default()
    }]);
    etherman.add_block(block, vec![Order::new(EventOrder::SequenceBatches, 0)]);

    let state = InMemoryState::new();
    state.set_auto_flush(false);
    let config = SynchronizerConfig {
        sync_interval: Duration::from_millis(10),
        genesis_block_number: GENESIS,
        producer: producer_config(),
        ..Default::default()
    };
    let synchronizer = Synchronizer::new(
        config,
        state.clone(),
        vec![etherman],
        None,
        Arc::new(StaticCommittee(Bytes::new())),
    )?;

    // When
    let (shutdown, task) = spawn(synchronizer);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let blocked = state.blocks() == vec![mock_header(GENESIS)];
    state.set_stored_flush_id(state.last_flush_id());
    wait_for_last_block(&state, mock_header(30)).await?;
    let _ = shutdown.send(());
    task.await??;

    // Then
    assert!(blocked);
    assert!(state.virtual_batch(1).is_some());
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_responses_are_applied_in_order() -> eyre::Result<()> {
    // Given
    let etherman = Arc::new(MockEtherman::new(300));
    let expected = vec![12, 25, 38, 47, 150, 299];
    for number in &expected {
        etherman.add_block(L1Block::new(mock_header(*number)), vec![]);
    }
    etherman.delay_range(11, Duration::from_millis(100));
    etherman.delay_range(31, Duration::from_millis(50));
    etherman.fail_range(41, 2);
    let processor = Arc::new(RecordingBlockRangeProcessor::new());
    let config = SynchronizerConfig { producer: producer_config(), ..Default::default() };
    let mut orchestrator =
        Orchestrator::new(&config, (0..4).map(|_| etherman.clone()).collect(), processor.clone())?;

    // When
    let last_block =
        tokio::time::timeout(Duration::from_secs(10), orchestrator.start(mock_header(10))).await??;

    // Then
    let processed = processor.processed_numbers();
    assert!(processed.windows(2).all(|w| w[0] < w[1]));
    for number in expected {
        assert!(processed.contains(&number));
    }
    assert_eq!(last_block, mock_header(299));
    Ok(())
}
