//! Operational commands read from a file while the synchronizer runs.
//!
//! Each line of the file is a `command|arg|...` entry, for example `l1_orchestrator_reset|100`.
//! Only lines appended after the synchronizer started are processed.

use crate::{ExtControlError, OrchestratorHandle};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    future::Future,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// The default command file.
pub const DEFAULT_EXT_CONTROL_FILE: &str = "/tmp/synchronizer_in";

/// The interval between two reads of the command file.
#[cfg(not(any(test, feature = "test-utils")))]
const POLL_INTERVAL: Duration = Duration::from_millis(500);
#[cfg(any(test, feature = "test-utils"))]
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const ARGS_SEPARATOR: char = '|';

/// A command accepted by the [`ExtControl`].
pub trait ExtControlCmd: Send + Sync + Debug {
    /// The name of the command, the first field of a line.
    fn name(&self) -> &'static str;

    /// A one line usage description.
    fn help(&self) -> &'static str;

    /// Checks the arguments before the command is processed.
    fn validate_arguments(&self, args: &[&str]) -> Result<(), ExtControlError>;

    /// Executes the command, returning a message describing what was done.
    fn process(&self, args: &[&str]) -> Result<String, ExtControlError>;
}

fn invalid_arguments(command: &str, reason: impl Into<String>) -> ExtControlError {
    ExtControlError::InvalidArguments { command: command.to_string(), reason: reason.into() }
}

fn expect_no_arguments(command: &str, args: &[&str]) -> Result<(), ExtControlError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(invalid_arguments(command, format!("expected no arguments, got {}", args.len())))
    }
}

/// Lists the registered commands.
#[derive(Debug)]
struct HelpCmd {
    entries: Vec<(&'static str, &'static str)>,
}

impl ExtControlCmd for HelpCmd {
    fn name(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> &'static str {
        "help: lists the available commands"
    }

    fn validate_arguments(&self, args: &[&str]) -> Result<(), ExtControlError> {
        expect_no_arguments(self.name(), args)
    }

    fn process(&self, _args: &[&str]) -> Result<String, ExtControlError> {
        let lines = self.entries.iter().map(|(_, help)| *help).collect::<Vec<_>>();
        Ok(lines.join("\n"))
    }
}

/// Stops the L1 producer.
#[derive(Debug)]
struct ProducerStopCmd {
    orchestrator: OrchestratorHandle,
}

impl ExtControlCmd for ProducerStopCmd {
    fn name(&self) -> &'static str {
        "l1_producer_stop"
    }

    fn help(&self) -> &'static str {
        "l1_producer_stop: stops the L1 producer"
    }

    fn validate_arguments(&self, args: &[&str]) -> Result<(), ExtControlError> {
        expect_no_arguments(self.name(), args)
    }

    fn process(&self, _args: &[&str]) -> Result<String, ExtControlError> {
        self.orchestrator.stop_producer();
        Ok("producer stop requested".to_string())
    }
}

/// Restarts the producer and the consumer after a block.
#[derive(Debug)]
struct OrchestratorResetCmd {
    orchestrator: OrchestratorHandle,
}

impl OrchestratorResetCmd {
    fn block_number(&self, args: &[&str]) -> Result<u64, ExtControlError> {
        let [arg] = args else {
            return Err(invalid_arguments(
                self.name(),
                format!("expected a block number, got {} arguments", args.len()),
            ));
        };
        arg.trim()
            .parse()
            .map_err(|err| invalid_arguments(self.name(), format!("invalid block number {arg}: {err}")))
    }
}

impl ExtControlCmd for OrchestratorResetCmd {
    fn name(&self) -> &'static str {
        "l1_orchestrator_reset"
    }

    fn help(&self) -> &'static str {
        "l1_orchestrator_reset|<block_number>: restarts the L1 producer and consumer after the block"
    }

    fn validate_arguments(&self, args: &[&str]) -> Result<(), ExtControlError> {
        self.block_number(args).map(|_| ())
    }

    fn process(&self, args: &[&str]) -> Result<String, ExtControlError> {
        let block_number = self.block_number(args)?;
        self.orchestrator.reset(block_number);
        Ok(format!("orchestrator reset to block {block_number} requested"))
    }
}

/// Reads the lines appended to a file, remembering the position between reads.
#[derive(Debug)]
struct FileTail {
    path: PathBuf,
    offset: Option<u64>,
    partial: Vec<u8>,
}

impl FileTail {
    const fn new(path: PathBuf) -> Self {
        Self { path, offset: None, partial: Vec::new() }
    }

    /// Returns the complete lines appended since the previous read. The first read only records
    /// the end of the file.
    async fn read_new_lines(&mut self) -> Result<Vec<String>, ExtControlError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.offset.get_or_insert(0);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };
        let len = file.metadata().await?.len();
        let offset = match self.offset {
            None => {
                tracing::debug!(target: "l1_sync::ext_control", path = %self.path.display(), len, "skipping existing content");
                self.offset = Some(len);
                return Ok(Vec::new());
            }
            Some(offset) if offset > len => {
                tracing::info!(target: "l1_sync::ext_control", path = %self.path.display(), "command file truncated, reading from the start");
                self.partial.clear();
                0
            }
            Some(offset) => offset,
        };
        if offset == len {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset = Some(offset + read as u64);
        self.partial.extend_from_slice(&buf);

        let Some(end) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete: Vec<u8> = self.partial.drain(..=end).collect();
        Ok(String::from_utf8_lossy(&complete).lines().map(str::to_string).collect())
    }
}

/// Processes the commands appended to a control file.
#[derive(Debug)]
pub struct ExtControl {
    path: PathBuf,
    commands: BTreeMap<&'static str, Arc<dyn ExtControlCmd>>,
}

impl ExtControl {
    /// Returns a new [`ExtControl`] reading the file, with the default commands registered.
    pub fn new(path: impl AsRef<Path>, orchestrator: OrchestratorHandle) -> Self {
        let mut ext_control = Self { path: path.as_ref().to_path_buf(), commands: BTreeMap::new() };
        ext_control.register(Arc::new(ProducerStopCmd { orchestrator: orchestrator.clone() }));
        ext_control.register(Arc::new(OrchestratorResetCmd { orchestrator }));
        let mut help = HelpCmd { entries: Vec::new() };
        help.entries = std::iter::once((help.name(), help.help()))
            .chain(ext_control.commands.values().map(|cmd| (cmd.name(), cmd.help())))
            .collect();
        ext_control.register(Arc::new(help));
        ext_control
    }

    /// Registers a command, replacing any command with the same name.
    pub fn register(&mut self, command: Arc<dyn ExtControlCmd>) {
        tracing::trace!(target: "l1_sync::ext_control", name = command.name(), "registering command");
        self.commands.insert(command.name(), command);
    }

    /// Returns the names of the registered commands.
    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }

    /// Parses and executes a `command|arg|...` line.
    pub fn process_line(&self, line: &str) -> Result<String, ExtControlError> {
        let mut fields = line.trim().split(ARGS_SEPARATOR);
        let name = fields.next().unwrap_or_default().trim();
        let args = fields.collect::<Vec<_>>();
        let command =
            self.commands.get(name).ok_or_else(|| ExtControlError::UnknownCommand(name.to_string()))?;
        command.validate_arguments(&args)?;
        tracing::info!(target: "l1_sync::ext_control", command = name, ?args, "processing command");
        command.process(&args)
    }

    /// Tails the command file until the shutdown future resolves.
    pub async fn run_until_shutdown<F: Future<Output = ()>>(self, shutdown: F) {
        tracing::info!(target: "l1_sync::ext_control", path = %self.path.display(), commands = ?self.command_names(), "starting external control");
        let mut tail = FileTail::new(self.path.clone());
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "l1_sync::ext_control", "external control shut down");
                    return;
                }
                _ = interval.tick() => {
                    let lines = match tail.read_new_lines().await {
                        Ok(lines) => lines,
                        Err(err) => {
                            tracing::warn!(target: "l1_sync::ext_control", %err, "failed to read command file");
                            continue;
                        }
                    };
                    for line in lines.iter().filter(|line| !line.trim().is_empty()) {
                        match self.process_line(line) {
                            Ok(output) => tracing::info!(target: "l1_sync::ext_control", %line, %output, "command processed"),
                            Err(err) => tracing::warn!(target: "l1_sync::ext_control", %line, %err, "command failed"),
                        }
                    }
                }
            }
        }
    }
}
