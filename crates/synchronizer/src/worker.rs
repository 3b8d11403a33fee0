use crate::{
    message::{
        LastBlockResponse, RequestLastBlockMode, RollupInfoByBlockRange, RollupInfoRequest,
        RollupInfoResponse, WorkerResponse,
    },
    WorkerError,
};
use l1_sync_etherman::EthermanClient;
use l1_sync_primitives::L1BlockHeader;
use parking_lot::Mutex;
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, task::JoinHandle};

/// The status of a [`Worker`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Ready to accept a request.
    #[default]
    Idle,
    /// Executing a request.
    Working,
}

/// The status of a worker and the generation of its current request.
///
/// A task only reports its result if the generation it was started with is still current, so a
/// request that was cancelled can neither deliver a response nor free the worker.
#[derive(Debug, Default)]
struct WorkerState {
    status: WorkerStatus,
    generation: u64,
}

impl WorkerState {
    /// Returns true and marks the worker idle if `generation` is the current request.
    fn finish(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.status = WorkerStatus::Idle;
        true
    }
}

/// Wraps one L1 client and executes at most one request at a time.
#[derive(Debug)]
pub struct Worker<E> {
    id: usize,
    etherman: Arc<E>,
    state: Arc<Mutex<WorkerState>>,
    timeout: Option<Duration>,
    rollup_info_tx: mpsc::UnboundedSender<RollupInfoResponse>,
    last_block_tx: mpsc::UnboundedSender<LastBlockResponse>,
}

impl<E: EthermanClient + 'static> Worker<E> {
    /// Returns a new idle [`Worker`] sending its responses on the provided channels.
    pub fn new(
        id: usize,
        etherman: Arc<E>,
        timeout: Option<Duration>,
        rollup_info_tx: mpsc::UnboundedSender<RollupInfoResponse>,
        last_block_tx: mpsc::UnboundedSender<LastBlockResponse>,
    ) -> Self {
        Self {
            id,
            etherman,
            state: Arc::new(Mutex::new(WorkerState::default())),
            timeout,
            rollup_info_tx,
            last_block_tx,
        }
    }

    /// Returns the worker id.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns true if the worker can accept a request.
    pub fn is_idle(&self) -> bool {
        self.state.lock().status == WorkerStatus::Idle
    }

    /// Cancels the current request: the worker becomes idle and the result of the request in
    /// flight, if any, is dropped.
    pub(crate) fn cancel(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.status = WorkerStatus::Idle;
    }

    /// Fails with [`WorkerError::WorkerBusy`] if a request is already executing, otherwise
    /// returns the generation of the new request.
    fn try_start(&self) -> Result<u64, WorkerError> {
        let mut state = self.state.lock();
        if state.status != WorkerStatus::Idle {
            return Err(WorkerError::WorkerBusy);
        }
        state.status = WorkerStatus::Working;
        state.generation += 1;
        Ok(state.generation)
    }

    /// Spawns the retrieval of the rollup information of the requested range.
    ///
    /// The response is sent on the rollup info channel once the worker is idle again.
    pub fn async_request_rollup_info_by_block_range(
        &self,
        request: RollupInfoRequest,
    ) -> Result<JoinHandle<()>, WorkerError> {
        let generation = self.try_start()?;
        tracing::debug!(target: "l1_sync::workers", worker = self.id, block_range = %request.block_range, sleep_before = ?request.sleep_before, "requesting rollup info");

        let etherman = self.etherman.clone();
        let state = self.state.clone();
        let tx = self.rollup_info_tx.clone();
        let timeout = self.timeout;
        Ok(tokio::spawn(async move {
            if !request.sleep_before.is_zero() {
                tokio::time::sleep(request.sleep_before).await;
            }
            let start = Instant::now();
            let result = with_timeout(timeout, request_rollup_info(&*etherman, request)).await;
            let response = RollupInfoResponse {
                block_range: request.block_range,
                response: WorkerResponse { duration: start.elapsed(), result },
            };
            let mut state = state.lock();
            if state.finish(generation) {
                let _ = tx.send(response);
            }
        }))
    }

    /// Spawns the retrieval of the latest L1 block header.
    pub fn async_request_last_block(&self) -> Result<JoinHandle<()>, WorkerError> {
        let generation = self.try_start()?;
        tracing::trace!(target: "l1_sync::workers", worker = self.id, "requesting last block");

        let etherman = self.etherman.clone();
        let state = self.state.clone();
        let tx = self.last_block_tx.clone();
        let timeout = self.timeout;
        Ok(tokio::spawn(async move {
            let start = Instant::now();
            let result = with_timeout(timeout, async {
                etherman.header_by_number(None).await.map_err(WorkerError::from)
            })
            .await;
            let mut state = state.lock();
            if state.finish(generation) {
                let _ = tx.send(WorkerResponse { duration: start.elapsed(), result });
            }
        }))
    }

    /// Requests the latest L1 block header and waits for it.
    pub async fn request_last_block(
        &self,
        timeout: Duration,
    ) -> Result<L1BlockHeader, WorkerError> {
        let generation = self.try_start()?;
        let result = with_timeout(Some(timeout), async {
            self.etherman.header_by_number(None).await.map_err(WorkerError::from)
        })
        .await;
        self.state.lock().finish(generation);
        result
    }
}

async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, WorkerError>
where
    F: Future<Output = Result<T, WorkerError>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| WorkerError::Timeout)?,
        None => fut.await,
    }
}

async fn request_rollup_info<E: EthermanClient>(
    etherman: &E,
    request: RollupInfoRequest,
) -> Result<RollupInfoByBlockRange, WorkerError> {
    let block_range = request.block_range;
    let info = etherman.get_rollup_info_by_block_range(block_range.from, Some(block_range.to)).await?;

    let request_last_block = match request.request_last_block {
        RequestLastBlockMode::None => false,
        RequestLastBlockMode::IfNoBlocksInAnswer => info.blocks.is_empty(),
        RequestLastBlockMode::Always => true,
    };
    let last_block_of_range = if request_last_block {
        Some(etherman.eth_block_by_number(block_range.to).await?)
    } else {
        None
    };
    let previous_block_of_range = if request.request_previous_block {
        Some(etherman.eth_block_by_number(block_range.from.saturating_sub(1)).await?)
    } else {
        None
    };

    Ok(RollupInfoByBlockRange {
        block_range,
        blocks: info.blocks,
        orders: info.orders,
        last_block_of_range,
        previous_block_of_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1_sync_etherman::test_utils::{mock_header, MockEtherman};
    use l1_sync_primitives::{BlockRange, L1Block};

    fn worker(
        etherman: MockEtherman,
    ) -> (
        Worker<MockEtherman>,
        mpsc::UnboundedReceiver<RollupInfoResponse>,
        mpsc::UnboundedReceiver<LastBlockResponse>,
    ) {
        let (rollup_info_tx, rollup_info_rx) = mpsc::unbounded_channel();
        let (last_block_tx, last_block_rx) = mpsc::unbounded_channel();
        let worker = Worker::new(0, Arc::new(etherman), None, rollup_info_tx, last_block_tx);
        (worker, rollup_info_rx, last_block_rx)
    }

    #[tokio::test]
    async fn test_worker_busy_while_requesting() -> eyre::Result<()> {
        // Given
        let etherman = MockEtherman::new(100);
        etherman.delay_range(1, Duration::from_millis(50));
        let (worker, mut rollup_info_rx, _) = worker(etherman);

        // When
        worker.async_request_rollup_info_by_block_range(RollupInfoRequest::new(BlockRange::new(
            1, 10,
        )))?;
        let busy = worker.async_request_last_block();

        // Then
        assert!(matches!(busy, Err(WorkerError::WorkerBusy)));
        let response = rollup_info_rx.recv().await.ok_or_else(|| eyre::eyre!("closed"))?;
        assert_eq!(response.block_range, BlockRange::new(1, 10));
        assert!(worker.is_idle());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_range_requests_last_block() -> eyre::Result<()> {
        // Given
        let (worker, mut rollup_info_rx, _) = worker(MockEtherman::new(100));
        let mut request = RollupInfoRequest::new(BlockRange::new(1, 10));
        request.request_previous_block = true;

        // When
        worker.async_request_rollup_info_by_block_range(request)?;
        let response = rollup_info_rx.recv().await.ok_or_else(|| eyre::eyre!("closed"))?;

        // Then
        let info = response.response.result?;
        assert!(info.blocks.is_empty());
        assert_eq!(info.last_block_of_range, Some(mock_header(10)));
        assert_eq!(info.previous_block_of_range, Some(mock_header(0)));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_empty_range_skips_last_block() -> eyre::Result<()> {
        // Given
        let etherman = MockEtherman::new(100);
        etherman.add_block(L1Block::new(mock_header(5)), vec![]);
        let (worker, mut rollup_info_rx, _) = worker(etherman);

        // When
        worker.async_request_rollup_info_by_block_range(RollupInfoRequest::new(BlockRange::new(
            1, 10,
        )))?;
        let response = rollup_info_rx.recv().await.ok_or_else(|| eyre::eyre!("closed"))?;

        // Then
        let info = response.response.result?;
        assert_eq!(info.blocks.len(), 1);
        assert_eq!(info.last_block_of_range, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_request_is_not_reported() -> eyre::Result<()> {
        // Given
        let etherman = MockEtherman::new(100);
        etherman.delay_range(1, Duration::from_millis(50));
        etherman.delay_range(11, Duration::from_millis(300));
        let (worker, mut rollup_info_rx, _) = worker(etherman);
        let first = worker.async_request_rollup_info_by_block_range(RollupInfoRequest::new(
            BlockRange::new(1, 10),
        ))?;

        // When
        worker.cancel();
        worker.async_request_rollup_info_by_block_range(RollupInfoRequest::new(BlockRange::new(
            11, 20,
        )))?;
        first.await?;

        // Then
        assert!(!worker.is_idle());
        let response = rollup_info_rx.recv().await.ok_or_else(|| eyre::eyre!("closed"))?;
        assert_eq!(response.block_range, BlockRange::new(11, 20));
        assert!(worker.is_idle());
        assert!(rollup_info_rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_request_last_block() -> eyre::Result<()> {
        let (worker, _, mut last_block_rx) = worker(MockEtherman::new(42));

        assert_eq!(worker.request_last_block(Duration::from_secs(1)).await?.number, 42);

        worker.async_request_last_block()?;
        let response = last_block_rx.recv().await.ok_or_else(|| eyre::eyre!("closed"))?;
        assert_eq!(response.result?.number, 42);
        Ok(())
    }
}
