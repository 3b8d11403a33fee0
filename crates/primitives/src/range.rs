use core::fmt;

/// An inclusive range of L1 block numbers, `[from, to]`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    /// The first block of the range.
    pub from: u64,
    /// The last block of the range.
    pub to: u64,
}

impl BlockRange {
    /// Returns a new instance of [`BlockRange`].
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Returns true if both bounds are non zero and `from <= to`.
    pub const fn is_valid(&self) -> bool {
        self.from != 0 && self.to != 0 && self.from <= self.to
    }

    /// Returns true if the inclusive intervals intersect.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// Returns true if the block number lies within the range.
    pub const fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }

    /// Returns the amount of blocks covered by the range, 0 for an invalid range.
    pub const fn block_count(&self) -> u64 {
        if self.is_valid() {
            self.to - self.from + 1
        } else {
            0
        }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for BlockRange {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let from = u.int_in_range(1..=u32::MAX)? as u64;
        let width = u.arbitrary::<u16>()? as u64;
        Ok(Self { from, to: from + width })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(BlockRange::new(1, 1).is_valid());
        assert!(BlockRange::new(10, 20).is_valid());
        assert!(!BlockRange::new(0, 20).is_valid());
        assert!(!BlockRange::new(10, 0).is_valid());
        assert!(!BlockRange::new(21, 20).is_valid());
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let range = BlockRange::new(10, 20);

        assert!(range.overlaps(&BlockRange::new(20, 30)));
        assert!(range.overlaps(&BlockRange::new(1, 10)));
        assert!(range.overlaps(&BlockRange::new(12, 15)));
        assert!(!range.overlaps(&BlockRange::new(21, 30)));
        assert!(!range.overlaps(&BlockRange::new(1, 9)));
    }

    #[test]
    fn test_block_count() {
        assert_eq!(BlockRange::new(101, 111).block_count(), 11);
        assert_eq!(BlockRange::new(5, 4).block_count(), 0);
    }
}
