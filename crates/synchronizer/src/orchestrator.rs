//! Runs the producer and the consumer of a synchronization cycle.

use crate::{
    message::{ConsumerControl, L1SyncMessage},
    BlockRangeProcessor, Consumer, ConsumerHandle, OrchestratorError, Producer, ProducerError,
    ProducerHandle, SynchronizerConfig,
};
use l1_sync_etherman::EthermanClient;
use l1_sync_primitives::L1BlockHeader;
use std::sync::Arc;
use tokio::{sync::mpsc, task::AbortHandle};

/// A cloneable handle to command a running [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    producer: ProducerHandle,
    consumer: ConsumerHandle,
}

impl OrchestratorHandle {
    /// Restarts the producer and the consumer after the block.
    pub fn reset(&self, block_number: u64) {
        tracing::info!(target: "l1_sync::orchestrator", block_number, "resetting through handle");
        self.producer.reset(block_number);
        self.consumer.reset(block_number);
    }

    /// Stops the producer. The consumer stops once the queued messages are processed.
    pub fn stop_producer(&self) {
        self.producer.stop();
    }

    /// Returns true if the producer is running.
    pub fn is_producer_running(&self) -> bool {
        self.producer.is_running()
    }
}

/// Owns a [`Producer`] and a [`Consumer`] connected through a bounded channel and runs them
/// concurrently until the consumer is synchronized with L1 or one of them fails.
#[derive(Debug)]
pub struct Orchestrator<E, P> {
    producer: Option<Producer<E>>,
    consumer: Option<Consumer<P>>,
    handle: OrchestratorHandle,
    to_consumer: mpsc::Sender<L1SyncMessage>,
    tasks: Vec<AbortHandle>,
}

impl<E, P> Orchestrator<E, P>
where
    E: EthermanClient + 'static,
    P: BlockRangeProcessor + 'static,
{
    /// Returns a new [`Orchestrator`] with a producer worker per L1 client.
    pub fn new(
        config: &SynchronizerConfig,
        ethermans: Vec<Arc<E>>,
        processor: P,
    ) -> Result<Self, ProducerError> {
        let (tx, rx) = mpsc::channel(config.channel_capacity(ethermans.len()));
        let producer = Producer::new(config.producer, ethermans, tx.clone())?;
        let consumer = Consumer::new(config.consumer, processor, rx);
        let handle = OrchestratorHandle { producer: producer.handle(), consumer: consumer.handle() };
        Ok(Self {
            producer: Some(producer),
            consumer: Some(consumer),
            handle,
            to_consumer: tx,
            tasks: Vec::new(),
        })
    }

    /// Returns a handle to the running producer and consumer.
    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    /// Returns true if the producer is running.
    pub fn is_producer_running(&self) -> bool {
        self.handle.is_producer_running()
    }

    /// Restarts the producer and the consumer after the block.
    pub fn reset(&mut self, block_number: u64) {
        tracing::info!(target: "l1_sync::orchestrator", block_number, "resetting orchestrator");
        match self.producer.as_mut() {
            Some(producer) => producer.reset(block_number),
            None => self.handle.producer.reset(block_number),
        }
        match self.consumer.as_mut() {
            Some(consumer) => consumer.reset(block_number),
            None => self.handle.consumer.reset(block_number),
        }
    }

    /// Aborts the tasks of the current run. The orchestrator cannot be started again.
    pub fn abort(&mut self) {
        tracing::info!(target: "l1_sync::orchestrator", tasks = self.tasks.len(), "aborting orchestrator");
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Synchronizes from `last_block` until the consumer processed every block up to the L1 head.
    /// Returns the last block applied to the state.
    pub async fn start(
        &mut self,
        last_block: L1BlockHeader,
    ) -> Result<L1BlockHeader, OrchestratorError> {
        let (Some(mut producer), Some(mut consumer)) = (self.producer.take(), self.consumer.take())
        else {
            return Err(OrchestratorError::Aborted);
        };
        tracing::info!(target: "l1_sync::orchestrator", last_block = last_block.number, "starting synchronization cycle");

        producer.reset(last_block.number);
        consumer.discard_queued();
        consumer.reset(last_block.number);

        let mut producer_task = tokio::spawn(async move {
            let result = producer.run().await;
            (producer, result)
        });
        // a stop sent before the producer runs would be discarded as stale
        while !self.handle.is_producer_running() && !producer_task.is_finished() {
            tokio::task::yield_now().await;
        }
        let mut consumer_task = tokio::spawn(async move {
            let result = consumer.run(last_block).await;
            (consumer, result)
        });
        self.tasks = vec![producer_task.abort_handle(), consumer_task.abort_handle()];

        let (producer_result, consumer_result) = tokio::select! {
            res = &mut producer_task => {
                let (producer, producer_result) = res?;
                self.producer = Some(producer);
                tracing::info!(target: "l1_sync::orchestrator", ?producer_result, "producer finished first, stopping consumer");
                let res = tokio::select! {
                    res = &mut consumer_task => res,
                    _ = self.to_consumer.send(ConsumerControl::Stop.into()) => consumer_task.await,
                };
                let (consumer, consumer_result) = res?;
                self.consumer = Some(consumer);
                (producer_result, consumer_result)
            }
            res = &mut consumer_task => {
                let (consumer, consumer_result) = res?;
                self.consumer = Some(consumer);
                tracing::info!(target: "l1_sync::orchestrator", ?consumer_result, "consumer finished first, aborting producer");
                // the producer may be blocked sending to the channel the consumer no longer reads
                self.handle.producer.abort();
                let (producer, producer_result) = producer_task.await?;
                self.producer = Some(producer);
                (producer_result, consumer_result)
            }
        };
        self.tasks.clear();

        consumer_result?;
        producer_result?;
        let last_block_synced = self
            .consumer
            .as_ref()
            .and_then(Consumer::last_eth_block_synced)
            .ok_or(OrchestratorError::MissingLastBlockSynced)?;
        tracing::info!(target: "l1_sync::orchestrator", last_block = last_block_synced.number, "synchronization cycle finished");
        Ok(last_block_synced)
    }
}
