//! The messages exchanged between the workers, the producer and the consumer.

use crate::WorkerError;
use l1_sync_primitives::{BlockOrders, BlockRange, L1Block, L1BlockHeader};
use std::time::Duration;

/// The rollup information retrieved for a range of L1 blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollupInfoByBlockRange {
    /// The range the information covers.
    pub block_range: BlockRange,
    /// The blocks which emitted at least one rollup event.
    pub blocks: Vec<L1Block>,
    /// The emission order of the events of each block.
    pub orders: BlockOrders,
    /// The header of the last block of the range, when requested.
    pub last_block_of_range: Option<L1BlockHeader>,
    /// The header of the block preceding the range, when requested.
    pub previous_block_of_range: Option<L1BlockHeader>,
}

impl RollupInfoByBlockRange {
    /// Returns the header of the highest block received.
    pub fn highest_block_received(&self) -> Option<L1BlockHeader> {
        match (self.blocks.last(), self.last_block_of_range) {
            (Some(block), Some(last)) if last.number > block.number() => Some(last),
            (Some(block), _) => Some(block.header),
            (None, last) => last,
        }
    }
}

/// A control event sent to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ConsumerControl {
    /// No-op.
    #[display("none")]
    None,
    /// Stop immediately, dropping any queued message.
    #[display("stop")]
    Stop,
    /// The producer received every block up to `last_block`.
    #[display("producer_fully_synced({last_block})")]
    ProducerFullySynced {
        /// The highest block the producer delivered.
        last_block: u64,
    },
}

/// A message received by the consumer, in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L1SyncMessage {
    /// The rollup information of a range.
    Data(Box<RollupInfoByBlockRange>),
    /// A control event.
    Control(ConsumerControl),
}

impl L1SyncMessage {
    /// Returns the range of a data message.
    pub fn block_range(&self) -> Option<BlockRange> {
        match self {
            Self::Data(data) => Some(data.block_range),
            Self::Control(_) => None,
        }
    }
}

impl From<RollupInfoByBlockRange> for L1SyncMessage {
    fn from(value: RollupInfoByBlockRange) -> Self {
        Self::Data(Box::new(value))
    }
}

impl From<ConsumerControl> for L1SyncMessage {
    fn from(value: ConsumerControl) -> Self {
        Self::Control(value)
    }
}

/// The outcome of an asynchronous request executed by a worker.
#[derive(Debug)]
pub struct WorkerResponse<T> {
    /// The time the request took.
    pub duration: Duration,
    /// The result.
    pub result: Result<T, WorkerError>,
}

/// The response to a rollup information request.
#[derive(Debug)]
pub struct RollupInfoResponse {
    /// The requested range.
    pub block_range: BlockRange,
    /// The outcome.
    pub response: WorkerResponse<RollupInfoByBlockRange>,
}

/// The response to a last block request.
pub type LastBlockResponse = WorkerResponse<L1BlockHeader>;

/// When to request the header of the last block of a range.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RequestLastBlockMode {
    /// Never.
    #[default]
    None,
    /// Only if the range contains no rollup blocks.
    IfNoBlocksInAnswer,
    /// Always.
    Always,
}

/// A request for the rollup information of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupInfoRequest {
    /// The range.
    pub block_range: BlockRange,
    /// When to request the last block of the range.
    pub request_last_block: RequestLastBlockMode,
    /// Whether to request the block preceding the range.
    pub request_previous_block: bool,
    /// How long the worker waits before sending the request.
    pub sleep_before: Duration,
}

impl RollupInfoRequest {
    /// Returns a new request for the range, asking the last block only for empty answers.
    pub const fn new(block_range: BlockRange) -> Self {
        Self {
            block_range,
            request_last_block: RequestLastBlockMode::IfNoBlocksInAnswer,
            request_previous_block: false,
            sleep_before: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1_sync_etherman::test_utils::mock_header;

    #[test]
    fn test_highest_block_received() {
        let mut info = RollupInfoByBlockRange {
            block_range: BlockRange::new(10, 20),
            ..Default::default()
        };
        assert_eq!(info.highest_block_received(), None);

        info.blocks.push(L1Block::new(mock_header(15)));
        assert_eq!(info.highest_block_received(), Some(mock_header(15)));

        info.last_block_of_range = Some(mock_header(20));
        assert_eq!(info.highest_block_received(), Some(mock_header(20)));
    }
}
