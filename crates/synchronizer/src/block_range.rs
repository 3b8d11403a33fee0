use crate::SyncStatusError;
use l1_sync_primitives::BlockRange;

/// A [`BlockRange`] carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveBlockRange<T> {
    /// The range.
    pub block_range: BlockRange,
    /// The tag attached to the range.
    pub tag: T,
}

/// A set of non overlapping, tagged block ranges kept in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveBlockRanges<T> {
    ranges: Vec<LiveBlockRange<T>>,
}

impl<T> Default for LiveBlockRanges<T> {
    fn default() -> Self {
        Self { ranges: Vec::new() }
    }
}

impl<T> LiveBlockRanges<T> {
    /// Returns an empty set.
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Adds the range with the provided tag.
    ///
    /// Fails if the range is invalid or overlaps a range already in the set.
    pub fn add(&mut self, block_range: BlockRange, tag: T) -> Result<(), SyncStatusError> {
        if !block_range.is_valid() {
            return Err(SyncStatusError::InvalidRange(block_range));
        }
        if let Some(existing) = self.ranges.iter().find(|r| r.block_range.overlaps(&block_range)) {
            return Err(SyncStatusError::Overlap { range: block_range, existing: existing.block_range });
        }
        self.ranges.push(LiveBlockRange { block_range, tag });
        Ok(())
    }

    /// Removes the exact range from the set, returning its tag.
    pub fn remove(&mut self, block_range: &BlockRange) -> Result<T, SyncStatusError> {
        let index = self
            .ranges
            .iter()
            .position(|r| &r.block_range == block_range)
            .ok_or(SyncStatusError::UnknownRange(*block_range))?;
        Ok(self.ranges.remove(index).tag)
    }

    /// Returns the tag of the exact range, if present.
    pub fn get_tag(&self, block_range: &BlockRange) -> Option<&T> {
        self.ranges.iter().find(|r| &r.block_range == block_range).map(|r| &r.tag)
    }

    /// Returns true if the exact range is in the set.
    pub fn contains(&self, block_range: &BlockRange) -> bool {
        self.get_tag(block_range).is_some()
    }

    /// Returns the ranges matching the predicate.
    pub fn filter<F>(&self, mut predicate: F) -> Vec<&LiveBlockRange<T>>
    where
        F: FnMut(&LiveBlockRange<T>) -> bool,
    {
        self.ranges.iter().filter(|r| predicate(r)).collect()
    }

    /// Returns the smallest range enclosing all the ranges of the set.
    pub fn super_range(&self) -> Option<BlockRange> {
        let from = self.ranges.iter().map(|r| r.block_range.from).min()?;
        let to = self.ranges.iter().map(|r| r.block_range.to).max()?;
        Some(BlockRange::new(from, to))
    }

    /// Returns the range inserted first.
    pub fn first(&self) -> Option<&LiveBlockRange<T>> {
        self.ranges.first()
    }

    /// Returns an iterator over the ranges, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveBlockRange<T>> {
        self.ranges.iter()
    }

    /// Returns the amount of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Removes all the ranges.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
