//! The consumer applies the rollup information to the state in block order.

use crate::{
    message::{ConsumerControl, L1SyncMessage, RollupInfoByBlockRange},
    metrics::ConsumerMetrics,
    BlockRangeProcessor, ConsumerConfig, ConsumerError,
};
use l1_sync_primitives::{L1Block, L1BlockHeader};
use parking_lot::Mutex;
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;

mod statistics;
use statistics::ConsumerStatistics;

/// The handle used to reset the [`Consumer`] while it runs.
#[derive(Debug, Clone, Default)]
pub struct ConsumerHandle {
    pending_reset: Arc<Mutex<Option<u64>>>,
}

impl ConsumerHandle {
    /// Makes the consumer restart after the block. Applied before the next message is handled.
    pub fn reset(&self, block_number: u64) {
        tracing::info!(target: "l1_sync::consumer", block_number, "requesting consumer reset");
        *self.pending_reset.lock() = Some(block_number);
    }
}

/// Receives the ordered rollup information and applies it through a [`BlockRangeProcessor`].
#[derive(Debug)]
pub struct Consumer<P> {
    config: ConsumerConfig,
    processor: P,
    incoming: mpsc::Receiver<L1SyncMessage>,
    handle: ConsumerHandle,
    highest_block_processed: Option<u64>,
    last_eth_block_synced: Option<L1BlockHeader>,
    last_eth_block_received: Option<L1BlockHeader>,
    statistics: ConsumerStatistics,
    metrics: ConsumerMetrics,
}

impl<P: BlockRangeProcessor> Consumer<P> {
    /// Returns a new [`Consumer`] reading from the channel.
    pub fn new(
        config: ConsumerConfig,
        processor: P,
        incoming: mpsc::Receiver<L1SyncMessage>,
    ) -> Self {
        Self {
            config: config.normalize(),
            processor,
            incoming,
            handle: ConsumerHandle::default(),
            highest_block_processed: None,
            last_eth_block_synced: None,
            last_eth_block_received: None,
            statistics: ConsumerStatistics::default(),
            metrics: ConsumerMetrics::default(),
        }
    }

    /// Returns a handle to reset the consumer while it runs.
    pub fn handle(&self) -> ConsumerHandle {
        self.handle.clone()
    }

    /// Restarts after the block, forgetting the last synced block.
    pub fn reset(&mut self, block_number: u64) {
        tracing::info!(target: "l1_sync::consumer", block_number, "resetting consumer");
        self.highest_block_processed = Some(block_number);
        self.last_eth_block_synced = None;
        self.last_eth_block_received = None;
        self.statistics.on_reset();
    }

    /// Returns the last block applied to the state.
    pub const fn last_eth_block_synced(&self) -> Option<L1BlockHeader> {
        self.last_eth_block_synced
    }

    /// Returns the highest block processed.
    pub const fn highest_block_processed(&self) -> Option<u64> {
        self.highest_block_processed
    }

    /// Drops the messages left in the channel by a previous run, returning how many.
    pub fn discard_queued(&mut self) -> usize {
        let mut discarded = 0;
        while self.incoming.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(target: "l1_sync::consumer", discarded, "discarded queued messages");
        }
        discarded
    }

    fn apply_pending_reset(&mut self) {
        let pending = self.handle.pending_reset.lock().take();
        if let Some(block_number) = pending {
            self.reset(block_number);
        }
    }

    /// Processes messages until a stop, or until the producer is synchronized and nothing is
    /// queued. `last_block` is the last block stored in the state.
    pub async fn run(&mut self, last_block: L1BlockHeader) -> Result<(), ConsumerError> {
        self.apply_pending_reset();
        let highest = *self.highest_block_processed.get_or_insert(last_block.number);
        if highest == last_block.number && self.last_eth_block_received.is_none() {
            self.last_eth_block_received = Some(last_block);
        }
        self.last_eth_block_synced = Some(last_block);
        tracing::info!(target: "l1_sync::consumer", highest_block_processed = ?self.highest_block_processed, "starting consumer");
        self.statistics.on_start();

        loop {
            self.statistics.on_start_step();
            let message = self.incoming.recv().await.ok_or(ConsumerError::IncomingChannelClosed)?;
            self.statistics.on_message_received(&self.config);
            self.apply_pending_reset();

            match message {
                L1SyncMessage::Data(info) => self.process_rollup_info(*info).await?,
                L1SyncMessage::Control(control) => {
                    if self.process_control(control)? {
                        tracing::info!(target: "l1_sync::consumer", %control, statistics = %self.statistics, "consumer finished");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns true if the consumer must stop.
    fn process_control(&self, control: ConsumerControl) -> Result<bool, ConsumerError> {
        tracing::debug!(target: "l1_sync::consumer", %control, "processing control message");
        match control {
            ConsumerControl::None => Ok(false),
            ConsumerControl::Stop => {
                tracing::info!(target: "l1_sync::consumer", queued = self.incoming.len(), "received stop, ignoring queued messages");
                Ok(true)
            }
            ConsumerControl::ProducerFullySynced { last_block } => {
                if !self.incoming.is_empty() {
                    tracing::info!(target: "l1_sync::consumer", queued = self.incoming.len(), "producer synchronized but messages are queued, continuing");
                    return Ok(false);
                }
                let processed = self.highest_block_processed.unwrap_or_default();
                if self.highest_block_processed.is_some() && processed != last_block {
                    tracing::warn!(target: "l1_sync::consumer", processed, producer = last_block, "consumer and producer are desynchronized");
                    return Err(ConsumerError::Desynchronized { processed, producer: last_block });
                }
                tracing::info!(target: "l1_sync::consumer", last_block, "producer synchronized and nothing queued, stopping");
                Ok(true)
            }
        }
    }

    fn check_previous_block(&self, info: &RollupInfoByBlockRange) -> Result<(), ConsumerError> {
        let (Some(cached), Some(previous)) = (self.last_eth_block_received, info.previous_block_of_range)
        else {
            return Ok(());
        };
        if cached.number != previous.number {
            return Ok(());
        }
        if cached.hash != previous.hash || cached.parent_hash != previous.parent_hash {
            tracing::error!(target: "l1_sync::consumer", block_number = cached.number, cached = %cached.hash, received = %previous.hash, "previous block of the range changed");
            return Err(ConsumerError::L1Reorg { block_number: cached.number });
        }
        tracing::trace!(target: "l1_sync::consumer", block_number = cached.number, "verified previous block");
        Ok(())
    }

    async fn process_rollup_info(&mut self, info: RollupInfoByBlockRange) -> Result<(), ConsumerError> {
        let block_range = info.block_range;
        if let Some(highest) = self.highest_block_processed {
            if highest + 1 != block_range.from {
                tracing::warn!(target: "l1_sync::consumer", highest, %block_range, "ignoring rollup info with an unexpected range");
                return Ok(());
            }
        }
        self.highest_block_processed = Some(block_range.to);
        tracing::debug!(target: "l1_sync::consumer", %block_range, blocks = info.blocks.len(), statistics = %self.statistics, "processing rollup info");

        self.check_previous_block(&info)?;
        if let Some(received) = info.highest_block_received() {
            self.last_eth_block_received = Some(received);
        }

        let start = Instant::now();
        let last_processed = match (info.blocks.last(), info.last_block_of_range) {
            (Some(last), _) => {
                self.processor.process_block_range(&info.blocks, &info.orders).await?;
                Some(last.header)
            }
            (None, Some(header)) => {
                self.processor.process_block_range(&[L1Block::new(header)], &info.orders).await?;
                Some(header)
            }
            (None, None) => {
                tracing::trace!(target: "l1_sync::consumer", %block_range, "empty range without last block");
                None
            }
        };
        if last_processed.is_some() {
            self.last_eth_block_synced = last_processed;
        }

        let duration = start.elapsed();
        self.statistics.on_processed(&info, duration);
        self.metrics.record_range(&info, duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        random,
        test_utils::{empty_rollup_info, Arbitrary, RecordingBlockRangeProcessor},
    };
    use l1_sync_etherman::test_utils::mock_header;
    use std::time::Duration;

    fn consumer(
        processor: Arc<RecordingBlockRangeProcessor>,
    ) -> (Consumer<Arc<RecordingBlockRangeProcessor>>, mpsc::Sender<L1SyncMessage>) {
        let (tx, rx) = mpsc::channel(10);
        (Consumer::new(ConsumerConfig::default(), processor, rx), tx)
    }

    fn rollup_info(from: u64, to: u64, blocks: &[u64]) -> L1SyncMessage {
        RollupInfoByBlockRange {
            blocks: blocks.iter().map(|n| L1Block::new(mock_header(*n))).collect(),
            ..empty_rollup_info(from, to)
        }
        .into()
    }

    fn synced(last_block: u64) -> L1SyncMessage {
        ConsumerControl::ProducerFullySynced { last_block }.into()
    }

    #[tokio::test]
    async fn test_stops_when_synced_and_queue_empty() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        tx.send(rollup_info(101, 110, &[105, 108])).await?;
        tx.send(synced(110)).await?;

        // When
        consumer.run(mock_header(100)).await?;

        // Then
        assert_eq!(processor.processed_numbers(), vec![105, 108]);
        assert_eq!(consumer.last_eth_block_synced(), Some(mock_header(108)));
        assert_eq!(consumer.highest_block_processed(), Some(110));
        Ok(())
    }

    #[tokio::test]
    async fn test_synced_with_queued_messages_keeps_running() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor);
        tx.send(synced(100)).await?;
        tx.send(ConsumerControl::None.into()).await?;

        // When
        let task = tokio::spawn(async move { consumer.run(mock_header(100)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let running = !task.is_finished();
        tx.send(ConsumerControl::Stop.into()).await?;

        // Then
        tokio::time::timeout(Duration::from_secs(5), task).await???;
        assert!(running);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_range_advances_with_last_block_marker() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        let info = RollupInfoByBlockRange {
            last_block_of_range: Some(mock_header(120)),
            ..empty_rollup_info(101, 120)
        };
        tx.send(info.into()).await?;
        tx.send(synced(120)).await?;

        // When
        consumer.run(mock_header(100)).await?;

        // Then
        assert_eq!(processor.processed_numbers(), vec![120]);
        assert_eq!(consumer.last_eth_block_synced().map(|h| h.number), Some(120));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_range_without_marker_is_skipped() -> eyre::Result<()> {
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        tx.send(empty_rollup_info(101, 120).into()).await?;
        tx.send(synced(120)).await?;

        consumer.run(mock_header(100)).await?;

        assert_eq!(processor.calls(), 0);
        assert_eq!(consumer.last_eth_block_synced(), Some(mock_header(100)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unexpected_range_is_ignored() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        tx.send(rollup_info(90, 100, &[95])).await?;
        tx.send(rollup_info(111, 120, &[115])).await?;
        tx.send(rollup_info(101, 110, &[102])).await?;
        tx.send(ConsumerControl::Stop.into()).await?;

        // When
        consumer.run(mock_header(100)).await?;

        // Then
        assert_eq!(processor.processed_numbers(), vec![102]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_discards_queued_messages() -> eyre::Result<()> {
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        tx.send(ConsumerControl::Stop.into()).await?;
        tx.send(rollup_info(101, 110, &[102])).await?;

        consumer.run(mock_header(100)).await?;

        assert_eq!(processor.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_desynchronized_producer_is_an_error() -> eyre::Result<()> {
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor);
        tx.send(rollup_info(101, 110, &[])).await?;
        tx.send(synced(130)).await?;

        let res = consumer.run(mock_header(100)).await;

        assert!(matches!(res, Err(ConsumerError::Desynchronized { processed: 110, producer: 130 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_previous_block_is_a_reorg() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        let forked = L1BlockHeader { number: 110, ..random!(L1BlockHeader) };
        tx.send(RollupInfoByBlockRange {
            last_block_of_range: Some(mock_header(110)),
            previous_block_of_range: Some(mock_header(100)),
            ..empty_rollup_info(101, 110)
        }
        .into())
        .await?;
        tx.send(RollupInfoByBlockRange {
            previous_block_of_range: Some(forked),
            ..empty_rollup_info(111, 120)
        }
        .into())
        .await?;

        // When
        let res = consumer.run(mock_header(100)).await;

        // Then
        assert!(matches!(res, Err(ConsumerError::L1Reorg { block_number: 110 })));
        assert_eq!(processor.processed_numbers(), vec![110]);
        Ok(())
    }

    #[tokio::test]
    async fn test_processing_error_stops_the_consumer() -> eyre::Result<()> {
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        processor.fail_at(105);
        let (mut consumer, tx) = consumer(processor);
        tx.send(rollup_info(101, 110, &[103, 105])).await?;

        let res = consumer.run(mock_header(100)).await;

        assert!(matches!(res, Err(ConsumerError::Process(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_through_handle_rebases_the_consumer() -> eyre::Result<()> {
        // Given
        let processor = Arc::new(RecordingBlockRangeProcessor::new());
        let (mut consumer, tx) = consumer(processor.clone());
        let handle = consumer.handle();

        // When
        handle.reset(50);
        tx.send(rollup_info(101, 110, &[102])).await?;
        tx.send(rollup_info(51, 60, &[55])).await?;
        tx.send(synced(60)).await?;
        consumer.run(mock_header(100)).await?;

        // Then
        assert_eq!(processor.processed_numbers(), vec![55]);
        assert_eq!(consumer.last_eth_block_synced(), Some(mock_header(55)));
        Ok(())
    }
}
