use super::ProducerStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The capacity of the producer command channel.
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 5;

/// The commands that can be sent to the [`super::Producer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerCommand {
    /// Stop requesting rollup info and finish the run.
    Stop,
    /// Forget everything and restart after the provided block.
    Reset(u64),
    /// Wakes up the main loop.
    Nop,
}

/// The handle used to send commands to the [`super::Producer`].
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    to_producer_tx: mpsc::Sender<ProducerCommand>,
    status: Arc<Mutex<ProducerStatus>>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl ProducerHandle {
    pub(crate) const fn new(
        to_producer_tx: mpsc::Sender<ProducerCommand>,
        status: Arc<Mutex<ProducerStatus>>,
        cancel: Arc<Mutex<CancellationToken>>,
    ) -> Self {
        Self { to_producer_tx, status, cancel }
    }

    /// Returns the status of the producer.
    pub fn status(&self) -> ProducerStatus {
        *self.status.lock()
    }

    /// Returns true if the producer is running.
    pub fn is_running(&self) -> bool {
        self.status() != ProducerStatus::NoRunning
    }

    /// Sends a command to the producer.
    pub fn send_command(&self, command: ProducerCommand) {
        if let Err(err) = self.to_producer_tx.try_send(command) {
            tracing::error!(target: "l1_sync::producer", %err, ?command, "failed to send command to producer");
        }
    }

    /// Asks the running producer to stop. Does nothing if it is not running.
    pub fn stop(&self) {
        if self.is_running() {
            self.send_command(ProducerCommand::Stop);
        } else {
            tracing::debug!(target: "l1_sync::producer", "producer not running, ignoring stop");
        }
    }

    /// Cancels the current run of the producer, interrupting any pending wait including a send to
    /// a full outgoing channel.
    pub fn abort(&self) {
        tracing::debug!(target: "l1_sync::producer", running = self.is_running(), "aborting producer");
        self.cancel.lock().cancel();
    }

    /// Asks the producer to restart after the provided block.
    pub fn reset(&self, block_number: u64) {
        self.send_command(ProducerCommand::Reset(block_number));
    }

    /// Wakes up the producer main loop.
    pub fn nop(&self) {
        self.send_command(ProducerCommand::Nop);
    }
}
