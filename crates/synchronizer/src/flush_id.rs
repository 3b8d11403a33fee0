use crate::{metrics::FlushIdMetrics, FlushIdError};
use l1_sync_state::StateStore;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// The interval between two reads of the stored flush id while blocked.
#[cfg(not(any(test, feature = "test-utils")))]
const FLUSH_ID_POLL_INTERVAL: Duration = Duration::from_millis(100);
#[cfg(any(test, feature = "test-utils"))]
const FLUSH_ID_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct FlushIdInner {
    prover_id: Option<String>,
    previous_executor_flush_id: u64,
    latest_flush_id: u64,
    latest_flush_id_is_fulfilled: bool,
}

impl FlushIdInner {
    fn update_and_check_prover_id(&mut self, prover_id: &str) -> Result<(), FlushIdError> {
        match &self.prover_id {
            None => {
                tracing::info!(target: "l1_sync::flush_id", prover_id, "adopting prover id");
                self.prover_id = Some(prover_id.to_string());
                Ok(())
            }
            Some(previous) if previous != prover_id => {
                tracing::error!(target: "l1_sync::flush_id", previous, current = prover_id, "executor restarted, prover id changed");
                Err(FlushIdError::ProverIdChanged {
                    previous: previous.clone(),
                    current: prover_id.to_string(),
                })
            }
            Some(_) => Ok(()),
        }
    }
}

/// Blocks the synchronizer until the executor durably stored every write handed to it.
///
/// The executor assigns a flush id to each write and reports the highest one persisted through
/// the state. The identity of the executor process must not change during the lifetime of the
/// controller.
#[derive(Debug)]
pub struct FlushIdController<S> {
    state: S,
    inner: Mutex<FlushIdInner>,
    metrics: FlushIdMetrics,
}

impl<S: StateStore> FlushIdController<S> {
    /// Returns a new [`FlushIdController`] reading the stored flush id from the state.
    pub fn new(state: S) -> Self {
        Self {
            state,
            inner: Mutex::new(FlushIdInner {
                latest_flush_id_is_fulfilled: true,
                ..Default::default()
            }),
            metrics: FlushIdMetrics::default(),
        }
    }

    /// Records the flush id of the last write sent to the executor.
    pub fn pending_flush_id(&self, flush_id: u64, prover_id: &str) -> Result<(), FlushIdError> {
        tracing::debug!(target: "l1_sync::flush_id", flush_id, "pending flush id");
        let mut inner = self.inner.lock();
        inner.latest_flush_id = flush_id;
        inner.latest_flush_id_is_fulfilled = false;
        inner.update_and_check_prover_id(prover_id)
    }

    /// Adopts the prover id on the first call and fails if a later call reports another one.
    pub fn update_and_check_prover_id(&self, prover_id: &str) -> Result<(), FlushIdError> {
        self.inner.lock().update_and_check_prover_id(prover_id)
    }

    /// Returns true if no write is waiting to be stored.
    pub fn is_fulfilled(&self) -> bool {
        self.inner.lock().latest_flush_id_is_fulfilled
    }

    /// Waits until the stored flush id reaches the pending one.
    pub async fn check_flush_id(&self) -> Result<(), FlushIdError> {
        let (latest_flush_id, previous_executor_flush_id) = {
            let inner = self.inner.lock();
            if inner.latest_flush_id_is_fulfilled {
                tracing::trace!(target: "l1_sync::flush_id", flush_id = inner.latest_flush_id, "no pending flush id");
                return Ok(());
            }
            (inner.latest_flush_id, inner.previous_executor_flush_id)
        };

        let stored = self.state.get_stored_flush_id().await?;
        if stored.flush_id != previous_executor_flush_id {
            tracing::info!(target: "l1_sync::flush_id", stored = stored.flush_id, pending = latest_flush_id, prover_id = stored.prover_id, "executor flush id");
        }
        self.update_and_check_prover_id(&stored.prover_id)?;

        let mut stored_flush_id = stored.flush_id;
        if stored_flush_id < latest_flush_id {
            tracing::info!(target: "l1_sync::flush_id", stored = stored_flush_id, pending = latest_flush_id, "synchronizer blocked, waiting for the executor to store the flush id");
            self.metrics.blocked_waits.increment(1);
            let start = Instant::now();
            let mut iteration = 0usize;
            while stored_flush_id < latest_flush_id {
                tokio::time::sleep(FLUSH_ID_POLL_INTERVAL).await;
                let stored = self.state.get_stored_flush_id().await?;
                self.update_and_check_prover_id(&stored.prover_id)?;
                stored_flush_id = stored.flush_id;
                iteration += 1;
                tracing::trace!(target: "l1_sync::flush_id", stored = stored_flush_id, pending = latest_flush_id, iteration, elapsed = ?start.elapsed(), "waiting for flush id");
            }
            self.metrics.wait_duration.record(start.elapsed().as_secs_f64());
            tracing::info!(target: "l1_sync::flush_id", flush_id = latest_flush_id, "synchronizer resumed");
        }

        let mut inner = self.inner.lock();
        // A newer pending flush id may have arrived while waiting.
        if inner.latest_flush_id == latest_flush_id {
            inner.latest_flush_id_is_fulfilled = true;
        }
        inner.previous_executor_flush_id = stored_flush_id;
        tracing::debug!(target: "l1_sync::flush_id", pending = latest_flush_id, stored = stored_flush_id, "pending flush id fulfilled");
        Ok(())
    }
}
