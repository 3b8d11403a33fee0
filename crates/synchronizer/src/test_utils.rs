//! Common test helpers

pub use arbitrary::Arbitrary;

use crate::{message::RollupInfoByBlockRange, BlockRangeProcessError, BlockRangeProcessor};
use l1_sync_primitives::{BlockOrders, BlockRange, L1Block, L1BlockHeader};
use l1_sync_state::StateError;
use parking_lot::Mutex;
use std::time::Duration;

/// Returns an arbitrary instance of the passed type.
#[macro_export]
macro_rules! random {
    ($typ: ty) => {{
        let mut bytes = Box::new([0u8; size_of::<$typ>() * 4]);
        let mut rng = ::rand::rng();
        ::rand::RngCore::fill_bytes(&mut rng, bytes.as_mut_slice());
        let mut u = ::arbitrary::Unstructured::new(bytes.as_slice());
        <$typ>::arbitrary(&mut u).unwrap()
    }};
}

/// Returns an empty [`RollupInfoByBlockRange`] for the range.
pub fn empty_rollup_info(from: u64, to: u64) -> RollupInfoByBlockRange {
    RollupInfoByBlockRange { block_range: BlockRange::new(from, to), ..Default::default() }
}

/// A [`BlockRangeProcessor`] recording the blocks it is given.
#[derive(Debug, Default)]
pub struct RecordingBlockRangeProcessor {
    processed: Mutex<Vec<L1BlockHeader>>,
    calls: Mutex<usize>,
    fail_at: Mutex<Option<u64>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingBlockRangeProcessor {
    /// Returns a new [`RecordingBlockRangeProcessor`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the headers of the processed blocks, in order.
    pub fn processed(&self) -> Vec<L1BlockHeader> {
        self.processed.lock().clone()
    }

    /// Returns the numbers of the processed blocks, in order.
    pub fn processed_numbers(&self) -> Vec<u64> {
        self.processed.lock().iter().map(|h| h.number).collect()
    }

    /// Returns the amount of calls to the processor.
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Makes the processing of the block fail.
    pub fn fail_at(&self, block_number: u64) {
        *self.fail_at.lock() = Some(block_number);
    }

    /// Delays every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait::async_trait]
impl BlockRangeProcessor for RecordingBlockRangeProcessor {
    async fn process_block_range(
        &self,
        blocks: &[L1Block],
        _orders: &BlockOrders,
    ) -> Result<(), BlockRangeProcessError> {
        *self.calls.lock() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fail_at = *self.fail_at.lock();
        for block in blocks {
            if fail_at == Some(block.number()) {
                return Err(StateError::BlockNotFound(block.number()).into());
            }
            self.processed.lock().push(block.header);
        }
        Ok(())
    }
}
