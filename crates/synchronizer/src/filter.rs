use crate::{message::L1SyncMessage, FilterError};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct FilterInner {
    last_block_on_synchronizer: u64,
    pending: Vec<L1SyncMessage>,
}

impl FilterInner {
    /// Returns the position of the next releasable message: a control message at the head of the
    /// buffer, otherwise the data message starting right after the last released block.
    fn next_releasable(&self) -> Option<usize> {
        if matches!(self.pending.first(), Some(L1SyncMessage::Control(_))) {
            return Some(0);
        }
        self.pending.iter().position(|msg| {
            msg.block_range().is_some_and(|r| r.from == self.last_block_on_synchronizer + 1)
        })
    }
}

/// Buffers the rollup information received out of order and releases it in ascending block order.
///
/// A control message is released once every message received before it was released.
#[derive(Debug, Default)]
pub struct OrderingFilter {
    inner: Mutex<FilterInner>,
}

impl OrderingFilter {
    /// Returns a new [`OrderingFilter`] that released everything up to `last_block`.
    pub fn new(last_block: u64) -> Self {
        Self {
            inner: Mutex::new(FilterInner {
                last_block_on_synchronizer: last_block,
                pending: Vec::new(),
            }),
        }
    }

    /// Adds the message and returns the messages that can now be released, in order.
    ///
    /// Fails if a data message starts at or below the last released block.
    pub fn filter(&self, msg: L1SyncMessage) -> Result<Vec<L1SyncMessage>, FilterError> {
        let mut inner = self.inner.lock();
        if let Some(range) = msg.block_range() {
            if range.from <= inner.last_block_on_synchronizer {
                return Err(FilterError::AlreadyDelivered {
                    range,
                    last_block: inner.last_block_on_synchronizer,
                });
            }
        }
        inner.pending.push(msg);

        let mut released = Vec::new();
        while let Some(index) = inner.next_releasable() {
            let msg = inner.pending.remove(index);
            if let Some(range) = msg.block_range() {
                inner.last_block_on_synchronizer = range.to;
            }
            released.push(msg);
        }
        if !inner.pending.is_empty() {
            tracing::trace!(target: "l1_sync::filter", pending = inner.pending.len(), last_block = inner.last_block_on_synchronizer, "messages waiting for a gap");
        }
        Ok(released)
    }

    /// Drops the pending messages and restarts after `last_block`.
    pub fn reset(&self, last_block: u64) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.last_block_on_synchronizer = last_block;
    }

    /// Returns the amount of messages waiting to be released.
    pub fn num_items_blocked_in_queue(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns the last block released.
    pub fn last_block_on_synchronizer(&self) -> u64 {
        self.inner.lock().last_block_on_synchronizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ConsumerControl, RollupInfoByBlockRange};
    use l1_sync_primitives::BlockRange;
    use rand::seq::SliceRandom;

    fn data(from: u64, to: u64) -> L1SyncMessage {
        RollupInfoByBlockRange { block_range: BlockRange::new(from, to), ..Default::default() }
            .into()
    }

    fn ranges(messages: &[L1SyncMessage]) -> Vec<Option<BlockRange>> {
        messages.iter().map(L1SyncMessage::block_range).collect()
    }

    #[test]
    fn test_out_of_order_ranges_are_released_in_order() -> eyre::Result<()> {
        // Given
        let filter = OrderingFilter::new(100);

        // When
        let first = filter.filter(data(131, 141))?;
        let second = filter.filter(data(120, 130))?;
        let third = filter.filter(data(101, 119))?;

        // Then
        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(
            ranges(&third),
            vec![
                Some(BlockRange::new(101, 119)),
                Some(BlockRange::new(120, 130)),
                Some(BlockRange::new(131, 141))
            ]
        );
        assert_eq!(filter.last_block_on_synchronizer(), 141);
        assert_eq!(filter.num_items_blocked_in_queue(), 0);
        Ok(())
    }

    #[test]
    fn test_already_delivered_range_is_rejected() -> eyre::Result<()> {
        let filter = OrderingFilter::new(100);
        filter.filter(data(101, 110))?;

        assert_eq!(
            filter.filter(data(105, 115)),
            Err(FilterError::AlreadyDelivered { range: BlockRange::new(105, 115), last_block: 110 })
        );
        assert_eq!(
            filter.filter(data(90, 100)),
            Err(FilterError::AlreadyDelivered { range: BlockRange::new(90, 100), last_block: 110 })
        );
        assert_eq!(filter.num_items_blocked_in_queue(), 0);
        Ok(())
    }

    #[test]
    fn test_control_waits_behind_pending_data() -> eyre::Result<()> {
        // Given
        let filter = OrderingFilter::new(0);
        let synced = L1SyncMessage::Control(ConsumerControl::ProducerFullySynced { last_block: 20 });
        filter.filter(data(11, 20))?;

        // When
        let held = filter.filter(synced.clone())?;
        let released = filter.filter(data(1, 10))?;

        // Then
        assert!(held.is_empty());
        assert_eq!(released.len(), 3);
        assert_eq!(released[2], synced);

        let immediate = filter.filter(ConsumerControl::Stop.into())?;
        assert_eq!(immediate, vec![L1SyncMessage::Control(ConsumerControl::Stop)]);
        Ok(())
    }

    #[test]
    fn test_control_keeps_its_place_among_later_data() -> eyre::Result<()> {
        // Given
        let filter = OrderingFilter::new(100);
        let stop = L1SyncMessage::Control(ConsumerControl::Stop);

        // When
        let held = [
            filter.filter(data(121, 130))?,
            filter.filter(stop.clone())?,
            filter.filter(data(131, 140))?,
        ];
        let released = filter.filter(data(101, 120))?;

        // Then
        assert!(held.iter().all(Vec::is_empty));
        assert_eq!(released, vec![data(101, 120), data(121, 130), stop, data(131, 140)]);
        assert_eq!(filter.last_block_on_synchronizer(), 140);
        Ok(())
    }

    #[test]
    fn test_no_gap_delivery_for_any_arrival_order() -> eyre::Result<()> {
        for _ in 0..20 {
            // Given
            let filter = OrderingFilter::new(1000);
            let mut messages = Vec::new();
            let mut from = 1001;
            while from <= 2000 {
                let to = (from + rand::random_range(0..50)).min(2000);
                messages.push(data(from, to));
                from = to + 1;
            }
            messages.shuffle(&mut rand::rng());

            // When
            let mut released = Vec::new();
            for msg in messages {
                released.extend(filter.filter(msg)?);
            }

            // Then
            let mut next = 1001;
            for range in ranges(&released).into_iter().flatten() {
                assert_eq!(range.from, next);
                next = range.to + 1;
            }
            assert_eq!(next, 2001);
        }
        Ok(())
    }

    #[test]
    fn test_reset_drops_pending() -> eyre::Result<()> {
        let filter = OrderingFilter::new(0);
        filter.filter(data(11, 20))?;

        filter.reset(50);

        assert_eq!(filter.num_items_blocked_in_queue(), 0);
        assert_eq!(ranges(&filter.filter(data(51, 60))?), vec![Some(BlockRange::new(51, 60))]);
        Ok(())
    }
}
