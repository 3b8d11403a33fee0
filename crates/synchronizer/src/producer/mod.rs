//! The producer requests the rollup information of L1 in parallel and delivers it in order.

use crate::{
    message::{
        ConsumerControl, L1SyncMessage, LastBlockResponse, RequestLastBlockMode, RollupInfoRequest,
        RollupInfoResponse,
    },
    metrics::ProducerMetrics,
    LastBlockOnL1, OrderingFilter, ProducerConfig, ProducerError, SyncStatus, WorkerError,
    WorkerPool,
};
use l1_sync_etherman::EthermanClient;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod command;
pub use command::{ProducerCommand, ProducerHandle};
use command::COMMAND_CHANNEL_CAPACITY;

mod statistics;
use statistics::ProducerStatistics;

/// The minimum wait of the main loop while synchronized.
#[cfg(not(any(test, feature = "test-utils")))]
const MIN_SYNCHRONIZED_TIMEOUT: Duration = Duration::from_secs(1);
#[cfg(any(test, feature = "test-utils"))]
const MIN_SYNCHRONIZED_TIMEOUT: Duration = Duration::from_millis(10);

/// The status of the [`Producer`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ProducerStatus {
    /// Running, without a known L1 head.
    #[display("idle")]
    Idle,
    /// Requesting ranges.
    #[display("working")]
    Working,
    /// Every block up to the L1 head was received.
    #[display("synchronized")]
    Synchronized,
    /// Not running.
    #[default]
    #[display("no_running")]
    NoRunning,
    /// Resetting to a new starting block.
    #[display("resetting")]
    Resetting,
}

/// Requests the rollup information of L1 ranges through a [`WorkerPool`] and sends it in block
/// order to the consumer.
#[derive(Debug)]
pub struct Producer<E> {
    config: ProducerConfig,
    sync_status: SyncStatus,
    workers: WorkerPool<E>,
    filter: OrderingFilter,
    outgoing: mpsc::Sender<L1SyncMessage>,
    commands_rx: mpsc::Receiver<ProducerCommand>,
    handle: ProducerHandle,
    status: Arc<Mutex<ProducerStatus>>,
    cancel: Arc<Mutex<CancellationToken>>,
    last_block_on_l1: LastBlockOnL1,
    last_block_request_in_flight: bool,
    statistics: ProducerStatistics,
    metrics: ProducerMetrics,
}

impl<E: EthermanClient + 'static> Producer<E> {
    /// Returns a new [`Producer`] with a worker per L1 client.
    pub fn new(
        config: ProducerConfig,
        ethermans: Vec<Arc<E>>,
        outgoing: mpsc::Sender<L1SyncMessage>,
    ) -> Result<Self, ProducerError> {
        let config = config.normalize()?;
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let status = Arc::new(Mutex::new(ProducerStatus::NoRunning));
        let cancel = Arc::new(Mutex::new(CancellationToken::new()));
        Ok(Self {
            sync_status: SyncStatus::new(0, config.sync_chunk_size),
            workers: WorkerPool::new(ethermans, config.workers()),
            filter: OrderingFilter::new(0),
            outgoing,
            commands_rx,
            handle: ProducerHandle::new(commands_tx, status.clone(), cancel.clone()),
            status,
            cancel,
            last_block_on_l1: LastBlockOnL1::default(),
            last_block_request_in_flight: false,
            statistics: ProducerStatistics::new(0),
            metrics: ProducerMetrics::default(),
            config,
        })
    }

    /// Returns a handle to send commands to the producer.
    pub fn handle(&self) -> ProducerHandle {
        self.handle.clone()
    }

    /// Returns the status.
    pub fn status(&self) -> ProducerStatus {
        *self.status.lock()
    }

    /// Returns the scheduler.
    pub const fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    /// Forgets every range and restarts after `start_block`. The L1 head is requested again.
    pub fn reset(&mut self, start_block: u64) {
        tracing::info!(target: "l1_sync::producer", start_block, "resetting producer");
        let running = self.status() != ProducerStatus::NoRunning;
        self.set_status_silently(ProducerStatus::Resetting);
        self.workers.stop();
        self.last_block_request_in_flight = false;
        self.last_block_on_l1 = LastBlockOnL1::default();
        self.sync_status.reset(start_block);
        self.filter.reset(start_block);
        self.statistics.reset(start_block);
        self.set_status_silently(if running { ProducerStatus::Idle } else { ProducerStatus::NoRunning });
    }

    /// Runs the producer until it is stopped or aborted through its handle.
    pub async fn run(&mut self) -> Result<(), ProducerError> {
        tracing::info!(target: "l1_sync::producer", status = %self.sync_status, "starting producer");
        // an abort requested before this run is stale
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        self.apply_queued_commands();
        self.set_status_silently(ProducerStatus::Idle);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(target: "l1_sync::producer", "producer aborted");
                Ok(())
            }
            res = self.run_loop() => res,
        };

        self.workers.stop();
        self.last_block_request_in_flight = false;
        self.set_status_silently(ProducerStatus::NoRunning);
        tracing::info!(target: "l1_sync::producer", ?result, "producer finished");
        result
    }

    /// Applies the resets queued while the producer was not running and drops the other commands.
    fn apply_queued_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                ProducerCommand::Reset(block_number) => self.reset(block_number),
                command => {
                    tracing::debug!(target: "l1_sync::producer", ?command, "discarding stale command")
                }
            }
        }
    }

    async fn run_loop(&mut self) -> Result<(), ProducerError> {
        let mut timeout = Duration::ZERO;
        loop {
            if self.status() == ProducerStatus::Idle && !self.last_block_on_l1.is_valid() {
                self.initialize_last_block_on_l1().await?;
            }

            let (rollup_info_rx, last_block_rx) = self.workers.receivers();
            tokio::select! {
                Some(command) = self.commands_rx.recv() => {
                    tracing::info!(target: "l1_sync::producer", ?command, "received command");
                    match command {
                        ProducerCommand::Stop => return Ok(()),
                        ProducerCommand::Reset(block_number) => {
                            self.reset(block_number);
                            continue;
                        }
                        ProducerCommand::Nop => {}
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::trace!(target: "l1_sync::producer", ?timeout, "main loop timeout");
                }
                Some(response) = rollup_info_rx.recv() => {
                    self.on_rollup_info_response(response).await?;
                }
                Some(response) = last_block_rx.recv() => {
                    self.on_last_block_response(response);
                }
            }

            self.step().await?;
            self.show_statistics_if_needed();
            timeout = self.next_timeout();
        }
    }

    async fn initialize_last_block_on_l1(&mut self) -> Result<(), ProducerError> {
        let header = self
            .workers
            .request_last_block_with_retries(
                self.config.timeout_for_request_last_block_on_l1,
                self.config.num_of_allowed_retries_for_request_last_block_on_l1,
            )
            .await
            .map_err(ProducerError::InitialLastBlock)?;
        self.on_new_last_block(header.number);
        Ok(())
    }

    /// Advances the state machine after an event.
    async fn step(&mut self) -> Result<(), ProducerError> {
        match self.status() {
            ProducerStatus::Idle => {
                if self.last_block_on_l1.is_valid() {
                    self.set_status(ProducerStatus::Working).await?;
                }
            }
            ProducerStatus::Working => {
                self.launch_work()?;
                let highest_requested = self.sync_status.highest_block_requested();
                if self.sync_status.have_required_all_blocks_to_be_synchronized() ||
                    self.sync_status.block_number_is_inside_unsafe_area(highest_requested)
                {
                    self.renew_last_block_on_l1_if_needed();
                }
                if self.sync_status.is_node_fully_synchronized_with_l1() {
                    self.set_status(ProducerStatus::Synchronized).await?;
                }
            }
            ProducerStatus::Synchronized => {
                self.renew_last_block_on_l1_if_needed();
                if self.launch_work()? > 0 {
                    self.set_status(ProducerStatus::Working).await?;
                }
            }
            ProducerStatus::NoRunning | ProducerStatus::Resetting => {}
        }
        Ok(())
    }

    /// Dispatches ranges to the idle workers, returning the amount launched.
    fn launch_work(&mut self) -> Result<usize, ProducerError> {
        let mut launched = 0;
        loop {
            let block_range = if self.can_send_new_requests() {
                self.sync_status.get_next_range()?
            } else {
                self.sync_status.get_next_range_only_retries()
            };
            let Some(block_range) = block_range else { break };

            let mut request = RollupInfoRequest::new(block_range);
            if self.sync_status.block_number_is_inside_unsafe_area(block_range.from) {
                request.request_last_block = RequestLastBlockMode::Always;
                request.request_previous_block = true;
            }
            match self.workers.async_request_rollup_info_by_block_range(request) {
                Ok(()) => {}
                Err(WorkerError::AllWorkersBusy) => break,
                Err(err) => {
                    tracing::warn!(target: "l1_sync::producer", %block_range, %err, "failed to launch request");
                    break;
                }
            }
            self.sync_status.on_started_new_worker(block_range)?;
            self.statistics.on_request_launched();
            self.metrics.ranges_requested.increment(1);
            launched += 1;
        }
        if launched > 0 {
            tracing::debug!(target: "l1_sync::producer", launched, status = %self.sync_status, "launched requests");
        }
        Ok(launched)
    }

    /// Returns false when the consumer is behind: the messages held by the filter and queued in
    /// the channel exceed its capacity.
    fn can_send_new_requests(&self) -> bool {
        let queued = self.filter.num_items_blocked_in_queue();
        let in_channel = self.outgoing.max_capacity() - self.outgoing.capacity();
        queued + in_channel <= self.outgoing.max_capacity()
    }

    fn renew_last_block_on_l1_if_needed(&mut self) {
        if self.last_block_request_in_flight || !self.last_block_on_l1.is_outdated() {
            return;
        }
        match self.workers.async_request_last_block() {
            Ok(()) => self.last_block_request_in_flight = true,
            Err(err) => {
                tracing::trace!(target: "l1_sync::producer", %err, "could not request last block on L1")
            }
        }
    }

    fn on_last_block_response(&mut self, response: LastBlockResponse) {
        self.last_block_request_in_flight = false;
        match response.result {
            Ok(header) => {
                let old = self.sync_status.last_block_on_l1();
                tracing::debug!(target: "l1_sync::producer", ?old, new = header.number, "new last block on L1");
                self.on_new_last_block(header.number);
            }
            Err(err) => {
                tracing::warn!(target: "l1_sync::producer", %err, "failed to request last block on L1")
            }
        }
    }

    fn on_new_last_block(&mut self, last_block: u64) {
        self.last_block_on_l1 = LastBlockOnL1::new(last_block, self.config.ttl_of_last_block_on_l1);
        let response = self.sync_status.on_new_last_block_on_l1(last_block);
        self.statistics.on_new_last_block(response.full_range.to);
        self.metrics.last_block_on_l1.set(response.full_range.to as f64);
        if let Some(extended_range) = response.extended_range {
            tracing::debug!(target: "l1_sync::producer", %extended_range, "L1 head extended");
        }
    }

    async fn on_rollup_info_response(
        &mut self,
        response: RollupInfoResponse,
    ) -> Result<(), ProducerError> {
        let RollupInfoResponse { block_range, response } = response;
        if self.status() == ProducerStatus::Resetting {
            tracing::info!(target: "l1_sync::producer", %block_range, "ignoring response while resetting");
            return Ok(());
        }
        let successful = response.result.is_ok();
        self.statistics.on_response(&block_range, successful, response.duration);
        self.metrics.record_response(successful, response.duration);
        self.workers.on_response_received(&block_range, successful);

        if let Err(err) = self.sync_status.on_finish_worker(block_range, successful) {
            tracing::info!(target: "l1_sync::producer", %block_range, %err, "ignoring response for a range no longer in flight");
            return Ok(());
        }

        match response.result {
            Ok(info) => {
                tracing::debug!(target: "l1_sync::producer", %block_range, blocks = info.blocks.len(), duration = ?response.duration, "received rollup info");
                let released = self.filter.filter(info.into())?;
                self.send_messages(released).await
            }
            Err(err) => {
                tracing::warn!(target: "l1_sync::producer", %block_range, %err, "failed to get rollup info by block range");
                Ok(())
            }
        }
    }

    async fn send_messages(&self, messages: Vec<L1SyncMessage>) -> Result<(), ProducerError> {
        for message in messages {
            tracing::trace!(target: "l1_sync::producer", range = ?message.block_range(), in_channel = self.outgoing.max_capacity() - self.outgoing.capacity(), "sending message to consumer");
            self.outgoing.send(message).await.map_err(|_| ProducerError::OutgoingChannelClosed)?;
        }
        Ok(())
    }

    fn set_status_silently(&self, status: ProducerStatus) {
        *self.status.lock() = status;
    }

    /// Sets the status, signalling the consumer when the producer becomes synchronized.
    async fn set_status(&mut self, status: ProducerStatus) -> Result<(), ProducerError> {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous == status {
            return Ok(());
        }
        tracing::info!(target: "l1_sync::producer", %previous, %status, "status changed");
        if status == ProducerStatus::Synchronized {
            let last_block = self.sync_status.last_block_store_on_state_db();
            tracing::info!(target: "l1_sync::producer", last_block, "synchronized, signalling consumer");
            self.metrics.synchronized_edges.increment(1);
            let released = self
                .filter
                .filter(ConsumerControl::ProducerFullySynced { last_block }.into())?;
            self.send_messages(released).await?;
        }
        Ok(())
    }

    fn next_timeout(&self) -> Duration {
        match self.status() {
            ProducerStatus::Synchronized => self
                .last_block_on_l1
                .time_to_expiry()
                .map_or(self.config.time_out_main_loop, |t| t.max(MIN_SYNCHRONIZED_TIMEOUT)),
            _ => self.config.time_out_main_loop,
        }
    }

    fn show_statistics_if_needed(&mut self) {
        let interval = self.config.time_for_show_up_statistics_log;
        if !interval.is_zero() && self.statistics.last_show_up.elapsed() > interval {
            tracing::info!(target: "l1_sync::producer", statistics = %self.statistics, "producer statistics");
            self.statistics.last_show_up = std::time::Instant::now();
        }
    }
}
