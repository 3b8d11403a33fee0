use crate::{
    message::{LastBlockResponse, RollupInfoRequest, RollupInfoResponse},
    retry::Retry,
    LiveBlockRanges, Worker, WorkerError,
};
use l1_sync_etherman::EthermanClient;
use l1_sync_primitives::{BlockRange, L1BlockHeader};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, task::JoinHandle};

/// The delay between two attempts to obtain the initial L1 head.
#[cfg(not(any(test, feature = "test-utils")))]
const LAST_BLOCK_RETRY_DELAY: Duration = Duration::from_secs(1);
#[cfg(any(test, feature = "test-utils"))]
const LAST_BLOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// The configuration of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkersConfig {
    /// The timeout of a rollup info request, `None` for no timeout.
    pub timeout_rollup_info: Option<Duration>,
    /// The minimum time between two launches of the same range.
    pub min_time_between_retries_for_rollup_info: Duration,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            timeout_rollup_info: None,
            min_time_between_retries_for_rollup_info: Duration::from_secs(5),
        }
    }
}

/// A pool of [`Worker`]s, one per L1 client.
///
/// All the workers send their responses on the two channels owned by the pool.
#[derive(Debug)]
pub struct WorkerPool<E> {
    workers: Vec<Worker<E>>,
    tasks: Vec<JoinHandle<()>>,
    next_worker: usize,
    config: WorkersConfig,
    launches: LiveBlockRanges<Instant>,
    rollup_info_rx: mpsc::UnboundedReceiver<RollupInfoResponse>,
    last_block_rx: mpsc::UnboundedReceiver<LastBlockResponse>,
}

impl<E: EthermanClient + 'static> WorkerPool<E> {
    /// Returns a new [`WorkerPool`] with a worker per client.
    pub fn new(ethermans: Vec<Arc<E>>, config: WorkersConfig) -> Self {
        let (rollup_info_tx, rollup_info_rx) = mpsc::unbounded_channel();
        let (last_block_tx, last_block_rx) = mpsc::unbounded_channel();
        let workers = ethermans
            .into_iter()
            .enumerate()
            .map(|(id, etherman)| {
                Worker::new(
                    id,
                    etherman,
                    config.timeout_rollup_info,
                    rollup_info_tx.clone(),
                    last_block_tx.clone(),
                )
            })
            .collect();
        Self {
            workers,
            tasks: Vec::new(),
            next_worker: 0,
            config,
            launches: LiveBlockRanges::new(),
            rollup_info_rx,
            last_block_rx,
        }
    }

    /// Returns the amount of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Returns the amount of idle workers.
    pub fn idle_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_idle()).count()
    }

    /// Returns the index of the next idle worker, round robin.
    fn next_idle_worker(&mut self) -> Result<usize, WorkerError> {
        if self.workers.is_empty() {
            return Err(WorkerError::NoWorkers);
        }
        let len = self.workers.len();
        let index = (0..len)
            .map(|offset| (self.next_worker + offset) % len)
            .find(|&index| self.workers[index].is_idle())
            .ok_or(WorkerError::AllWorkersBusy)?;
        self.next_worker = (index + 1) % len;
        Ok(index)
    }

    /// Sends the request to an idle worker.
    ///
    /// A range launched before is delayed so that two launches of it are at least
    /// `min_time_between_retries_for_rollup_info` apart.
    pub fn async_request_rollup_info_by_block_range(
        &mut self,
        mut request: RollupInfoRequest,
    ) -> Result<(), WorkerError> {
        let index = self.next_idle_worker()?;
        let now = Instant::now();
        if let Ok(last_launch) = self.launches.remove(&request.block_range) {
            let elapsed = now.duration_since(last_launch);
            request.sleep_before =
                self.config.min_time_between_retries_for_rollup_info.saturating_sub(elapsed);
        }

        let task = self.workers[index].async_request_rollup_info_by_block_range(request)?;
        self.track(task);
        if let Err(err) = self.launches.add(request.block_range, now + request.sleep_before) {
            tracing::warn!(target: "l1_sync::workers", block_range = %request.block_range, %err, "failed to track launch");
        }
        Ok(())
    }

    /// Sends a latest L1 block request to an idle worker.
    pub fn async_request_last_block(&mut self) -> Result<(), WorkerError> {
        let index = self.next_idle_worker()?;
        let task = self.workers[index].async_request_last_block()?;
        self.track(task);
        Ok(())
    }

    /// Requests the latest L1 block, retrying on failure up to `max_attempts` times.
    pub async fn request_last_block_with_retries(
        &self,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<L1BlockHeader, WorkerError> {
        let retry = Retry::new(max_attempts, LAST_BLOCK_RETRY_DELAY);
        let workers = &self.workers;
        retry
            .retry("request_last_block", |attempt| async move {
                let worker = workers
                    .iter()
                    .cycle()
                    .skip(attempt)
                    .take(workers.len())
                    .find(|w| w.is_idle())
                    .ok_or(WorkerError::AllWorkersBusy)?;
                worker.request_last_block(timeout).await
            })
            .await
    }

    /// Forgets the launch time of a range that was received.
    pub fn on_response_received(&mut self, block_range: &BlockRange, successful: bool) {
        if successful {
            let _ = self.launches.remove(block_range);
        }
    }

    /// Returns the rollup info and last block receivers, to be polled together.
    pub(crate) fn receivers(
        &mut self,
    ) -> (
        &mut mpsc::UnboundedReceiver<RollupInfoResponse>,
        &mut mpsc::UnboundedReceiver<LastBlockResponse>,
    ) {
        (&mut self.rollup_info_rx, &mut self.last_block_rx)
    }

    /// Receives the next rollup info response.
    pub async fn recv_rollup_info(&mut self) -> Option<RollupInfoResponse> {
        self.rollup_info_rx.recv().await
    }

    /// Receives the next last block response.
    pub async fn recv_last_block(&mut self) -> Option<LastBlockResponse> {
        self.last_block_rx.recv().await
    }

    /// Aborts the requests in flight and drops their pending responses.
    ///
    /// A request that already completed when its task is aborted is discarded by its worker, so
    /// no response of a stopped request is received afterwards.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for worker in &self.workers {
            worker.cancel();
        }
        while self.rollup_info_rx.try_recv().is_ok() {}
        while self.last_block_rx.try_recv().is_ok() {}
        self.launches.clear();
        tracing::debug!(target: "l1_sync::workers", "workers stopped");
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

impl<E> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
