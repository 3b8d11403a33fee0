//! The scheduler deciding which block ranges to request from L1.

use crate::{LiveBlockRanges, SyncStatusError};
use l1_sync_primitives::BlockRange;
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt};

/// The distance to the L1 head under which blocks may still be reorganized.
pub const UNSAFE_AREA_BLOCKS: u64 = 96;

/// The state of the scheduler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SyncStatusState {
    /// No range was requested yet.
    #[default]
    #[display("idle")]
    Idle,
    /// Ranges are being requested.
    #[display("working")]
    Working,
    /// All the blocks up to the L1 head were received.
    #[display("synchronized")]
    Synchronized,
}

/// The answer to a new L1 head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLastBlockResponse {
    /// The range from the last stored block to the L1 head.
    pub full_range: BlockRange,
    /// The blocks the new head added, `None` if the head did not grow.
    pub extended_range: Option<BlockRange>,
}

#[derive(Debug, Default)]
struct SyncStatusInner {
    last_block_store_on_state_db: u64,
    highest_block_requested: u64,
    last_block_on_l1: Option<u64>,
    amount_of_blocks_in_each_range: u64,
    processing_ranges: LiveBlockRanges<()>,
    error_ranges: LiveBlockRanges<()>,
    completed_ranges: BTreeMap<u64, u64>,
    state: SyncStatusState,
}

impl SyncStatusInner {
    fn next_range_only_retries(&self) -> Option<BlockRange> {
        self.error_ranges.first().map(|r| r.block_range)
    }

    fn next_range(&self) -> Result<Option<BlockRange>, SyncStatusError> {
        if let Some(retry) = self.next_range_only_retries() {
            return Ok(Some(retry));
        }
        let Some(last_block_on_l1) = self.last_block_on_l1 else {
            return Ok(None);
        };
        if last_block_on_l1 <= self.highest_block_requested {
            return Ok(None);
        }

        let from = self.highest_block_requested + 1;
        let to = last_block_on_l1.min(from.saturating_add(self.amount_of_blocks_in_each_range));
        let range = BlockRange::new(from, to);
        if !range.is_valid() {
            return Err(SyncStatusError::InvalidRange(range));
        }
        Ok(Some(range))
    }

    fn is_fully_synchronized(&self) -> bool {
        self.last_block_on_l1.is_some_and(|l1| l1 <= self.last_block_store_on_state_db) &&
            self.processing_ranges.is_empty() &&
            self.error_ranges.is_empty()
    }

    fn update_state(&mut self) {
        if self.is_fully_synchronized() {
            self.state = SyncStatusState::Synchronized;
        } else if self.state == SyncStatusState::Synchronized ||
            !self.processing_ranges.is_empty()
        {
            self.state = SyncStatusState::Working;
        }
    }

    /// Folds the completed ranges contiguous to the watermark into it.
    fn advance_watermark(&mut self) {
        while let Some(to) = self.completed_ranges.remove(&(self.last_block_store_on_state_db + 1)) {
            self.last_block_store_on_state_db = to;
        }
    }
}

impl fmt::Display for SyncStatusInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state: {}, last_block_store_on_state_db: {}, highest_block_requested: {}, last_block_on_l1: {:?}, processing: {}, errors: {}",
            self.state,
            self.last_block_store_on_state_db,
            self.highest_block_requested,
            self.last_block_on_l1,
            self.processing_ranges.len(),
            self.error_ranges.len()
        )
    }
}

/// Tracks the requested, in flight and failed block ranges.
///
/// All the methods take the internal lock once; the unlocked helpers live on the inner state.
#[derive(Debug, Default)]
pub struct SyncStatus {
    inner: Mutex<SyncStatusInner>,
}

impl SyncStatus {
    /// Returns a new [`SyncStatus`] starting after the last block stored on the state.
    pub fn new(last_block_store_on_state_db: u64, amount_of_blocks_in_each_range: u64) -> Self {
        Self {
            inner: Mutex::new(SyncStatusInner {
                last_block_store_on_state_db,
                highest_block_requested: last_block_store_on_state_db,
                amount_of_blocks_in_each_range,
                ..Default::default()
            }),
        }
    }

    /// Forgets all the tracked ranges and the L1 head, and restarts after the provided block.
    pub fn reset(&self, last_block_store_on_state_db: u64) {
        let mut inner = self.inner.lock();
        let chunk = inner.amount_of_blocks_in_each_range;
        *inner = SyncStatusInner {
            last_block_store_on_state_db,
            highest_block_requested: last_block_store_on_state_db,
            amount_of_blocks_in_each_range: chunk,
            ..Default::default()
        };
        tracing::debug!(target: "l1_sync::sync_status", status = %*inner, "reset");
    }

    /// Returns the next range to request: a failed range first, then the next unrequested one.
    pub fn get_next_range(&self) -> Result<Option<BlockRange>, SyncStatusError> {
        self.inner.lock().next_range()
    }

    /// Returns the next failed range to retry.
    pub fn get_next_range_only_retries(&self) -> Option<BlockRange> {
        self.inner.lock().next_range_only_retries()
    }

    /// Marks the range as in flight.
    pub fn on_started_new_worker(&self, block_range: BlockRange) -> Result<(), SyncStatusError> {
        let mut inner = self.inner.lock();
        if inner.error_ranges.remove(&block_range).is_ok() {
            tracing::info!(target: "l1_sync::sync_status", %block_range, "retrying range");
        }
        inner.processing_ranges.add(block_range, ())?;
        inner.highest_block_requested = inner.highest_block_requested.max(block_range.to);
        inner.state = SyncStatusState::Working;
        Ok(())
    }

    /// Marks the range as finished.
    ///
    /// A successful range moves the watermark once every range before it also completed, a failed
    /// one is queued for retry. Returns an error for a range that is not in flight.
    pub fn on_finish_worker(
        &self,
        block_range: BlockRange,
        successful: bool,
    ) -> Result<(), SyncStatusError> {
        let mut inner = self.inner.lock();
        inner.processing_ranges.remove(&block_range)?;

        if successful {
            if block_range.to > inner.last_block_store_on_state_db {
                inner.completed_ranges.insert(block_range.from, block_range.to);
                inner.advance_watermark();
            }
        } else {
            tracing::info!(target: "l1_sync::sync_status", %block_range, "range failed, queued for retry");
            inner.error_ranges.add(block_range, ())?;
        }
        inner.update_state();
        tracing::trace!(target: "l1_sync::sync_status", status = %*inner, "finished worker");
        Ok(())
    }

    /// Records a new L1 head. A lower head than the known one is ignored.
    pub fn on_new_last_block_on_l1(&self, last_block: u64) -> NewLastBlockResponse {
        let mut inner = self.inner.lock();
        let from = inner.last_block_store_on_state_db;

        let response = match inner.last_block_on_l1 {
            None => {
                inner.last_block_on_l1 = Some(last_block);
                NewLastBlockResponse {
                    full_range: BlockRange::new(from, last_block),
                    extended_range: Some(BlockRange::new(from, last_block)),
                }
            }
            Some(old) if last_block > old => {
                inner.last_block_on_l1 = Some(last_block);
                NewLastBlockResponse {
                    full_range: BlockRange::new(from, last_block),
                    extended_range: Some(BlockRange::new(old + 1, last_block)),
                }
            }
            Some(old) => {
                if last_block < old {
                    tracing::warn!(target: "l1_sync::sync_status", new = last_block, old, "last block on L1 decreased, keeping the old one");
                }
                NewLastBlockResponse { full_range: BlockRange::new(from, old), extended_range: None }
            }
        };
        inner.update_state();
        response
    }

    /// Returns the known L1 head.
    pub fn last_block_on_l1(&self) -> Option<u64> {
        self.inner.lock().last_block_on_l1
    }

    /// Returns the highest block up to which all the ranges were received.
    pub fn last_block_store_on_state_db(&self) -> u64 {
        self.inner.lock().last_block_store_on_state_db
    }

    /// Returns the highest block requested so far.
    pub fn highest_block_requested(&self) -> u64 {
        self.inner.lock().highest_block_requested
    }

    /// Returns true if every block up to the L1 head was requested at least once.
    pub fn have_required_all_blocks_to_be_synchronized(&self) -> bool {
        let inner = self.inner.lock();
        inner.last_block_on_l1.is_some_and(|l1| l1 <= inner.highest_block_requested)
    }

    /// Returns true if every block up to the L1 head was received and nothing is pending.
    pub fn is_node_fully_synchronized_with_l1(&self) -> bool {
        self.inner.lock().is_fully_synchronized()
    }

    /// Returns true if the block is close enough to the L1 head to be reorganized.
    pub fn block_number_is_inside_unsafe_area(&self, block_number: u64) -> bool {
        let inner = self.inner.lock();
        inner
            .last_block_on_l1
            .is_some_and(|l1| l1.saturating_sub(block_number) < UNSAFE_AREA_BLOCKS)
    }

    /// Returns the state.
    pub fn state(&self) -> SyncStatusState {
        self.inner.lock().state
    }

    /// Returns the amount of ranges in flight.
    pub fn processing_ranges(&self) -> usize {
        self.inner.lock().processing_ranges.len()
    }

    /// Returns the amount of failed ranges waiting for a retry.
    pub fn error_ranges(&self) -> usize {
        self.inner.lock().error_ranges.len()
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.lock(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn test_scenario_first_ranges_and_watermark() -> eyre::Result<()> {
        // Given
        let status = SyncStatus::new(100, 10);
        status.on_new_last_block_on_l1(150);

        // When
        let first = status.get_next_range()?;
        status.on_started_new_worker(BlockRange::new(101, 111))?;
        let second = status.get_next_range()?;
        status.on_finish_worker(BlockRange::new(101, 111), true)?;

        // Then
        assert_eq!(first, Some(BlockRange::new(101, 111)));
        assert_eq!(second, Some(BlockRange::new(112, 122)));
        assert_eq!(status.last_block_store_on_state_db(), 111);
        Ok(())
    }

    #[test]
    fn test_no_range_without_last_block_on_l1() -> eyre::Result<()> {
        let status = SyncStatus::new(100, 10);
        assert_eq!(status.get_next_range()?, None);

        status.on_new_last_block_on_l1(100);
        assert_eq!(status.get_next_range()?, None);
        Ok(())
    }

    #[test]
    fn test_in_flight_range_never_returned_again() -> eyre::Result<()> {
        // Given
        let status = SyncStatus::new(0, 7);
        status.on_new_last_block_on_l1(200);

        // When
        let mut dispatched = Vec::new();
        while let Some(range) = status.get_next_range()? {
            assert!(!dispatched.contains(&range));
            status.on_started_new_worker(range)?;
            dispatched.push(range);
        }

        // Then
        assert_eq!(dispatched.first().map(|r| r.from), Some(1));
        assert_eq!(dispatched.last().map(|r| r.to), Some(200));
        assert!(dispatched.windows(2).all(|w| w[0].to + 1 == w[1].from));
        assert!(status.have_required_all_blocks_to_be_synchronized());
        Ok(())
    }

    #[test]
    fn test_failed_range_is_retried_first() -> eyre::Result<()> {
        // Given
        let status = SyncStatus::new(0, 10);
        status.on_new_last_block_on_l1(100);
        let first = BlockRange::new(1, 11);
        status.on_started_new_worker(first)?;
        status.on_started_new_worker(BlockRange::new(12, 22))?;

        // When
        status.on_finish_worker(first, false)?;

        // Then
        assert_eq!(status.get_next_range()?, Some(first));
        assert_eq!(status.get_next_range_only_retries(), Some(first));
        status.on_started_new_worker(first)?;
        assert_eq!(status.error_ranges(), 0);
        assert_eq!(status.get_next_range()?, Some(BlockRange::new(23, 33)));
        Ok(())
    }

    #[test]
    fn test_unknown_finished_range_is_an_error() {
        let status = SyncStatus::new(0, 10);
        assert_eq!(
            status.on_finish_worker(BlockRange::new(1, 11), true),
            Err(SyncStatusError::UnknownRange(BlockRange::new(1, 11)))
        );
    }

    #[test]
    fn test_watermark_is_monotonic_and_contiguous() -> eyre::Result<()> {
        // Given
        let status = SyncStatus::new(0, 9);
        status.on_new_last_block_on_l1(500);
        let mut ranges = Vec::new();
        while let Some(range) = status.get_next_range()? {
            status.on_started_new_worker(range)?;
            ranges.push(range);
        }
        ranges.shuffle(&mut rand::rng());

        // When
        let mut finished = Vec::new();
        let mut previous = 0;
        for range in ranges {
            status.on_finish_worker(range, true)?;
            finished.push(range);

            // Then
            let watermark = status.last_block_store_on_state_db();
            assert!(watermark >= previous);
            let contiguous = (1..=watermark).all(|b| finished.iter().any(|r| r.contains(b)));
            assert!(contiguous);
            previous = watermark;
        }
        assert_eq!(status.last_block_store_on_state_db(), 500);
        assert!(status.is_node_fully_synchronized_with_l1());
        assert_eq!(status.state(), SyncStatusState::Synchronized);
        Ok(())
    }

    #[test]
    fn test_new_last_block_on_l1() {
        let status = SyncStatus::new(100, 10);

        let first = status.on_new_last_block_on_l1(150);
        assert_eq!(first.extended_range, Some(BlockRange::new(100, 150)));

        let grown = status.on_new_last_block_on_l1(160);
        assert_eq!(grown.full_range, BlockRange::new(100, 160));
        assert_eq!(grown.extended_range, Some(BlockRange::new(151, 160)));

        let same = status.on_new_last_block_on_l1(160);
        assert_eq!(same.extended_range, None);

        let lower = status.on_new_last_block_on_l1(155);
        assert_eq!(lower.extended_range, None);
        assert_eq!(status.last_block_on_l1(), Some(160));
    }

    #[test]
    fn test_reset_forgets_everything() -> eyre::Result<()> {
        // Given
        let status = SyncStatus::new(100, 10);
        status.on_new_last_block_on_l1(150);
        status.on_started_new_worker(BlockRange::new(101, 111))?;

        // When
        status.reset(50);

        // Then
        assert_eq!(status.last_block_on_l1(), None);
        assert_eq!(status.processing_ranges(), 0);
        assert_eq!(status.highest_block_requested(), 50);
        assert_eq!(status.state(), SyncStatusState::Idle);
        Ok(())
    }

    #[test]
    fn test_unsafe_area() {
        let status = SyncStatus::new(0, 10);
        assert!(!status.block_number_is_inside_unsafe_area(1));

        status.on_new_last_block_on_l1(1000);
        assert!(!status.block_number_is_inside_unsafe_area(904));
        assert!(status.block_number_is_inside_unsafe_area(905));
    }
}
