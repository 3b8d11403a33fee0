use crate::{
    BatchSequence, EventOrder, ForcedBatch, ForkId, GlobalExitRoot, L1InfoTreeLeaf, Order,
    SequencedBatch, SequencedForceBatch, UpdateEtrogSequence, VerifiedBatch,
};
use alloy_primitives::B256;

/// Information about a block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
}

impl BlockInfo {
    /// Returns a new instance of [`BlockInfo`].
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl From<&L1BlockHeader> for BlockInfo {
    fn from(value: &L1BlockHeader) -> Self {
        Self { number: value.number, hash: value.hash }
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for BlockInfo {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let number = u.int_in_range(0..=u32::MAX)?;
        let hash = B256::arbitrary(u)?;
        Ok(Self { number: number as u64, hash })
    }
}

/// The header fields of an L1 block the synchronizer persists.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct L1BlockHeader {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block timestamp.
    pub timestamp: u64,
}

impl L1BlockHeader {
    /// Returns a new instance of [`L1BlockHeader`].
    pub const fn new(number: u64, hash: B256, parent_hash: B256, timestamp: u64) -> Self {
        Self { number, hash, parent_hash, timestamp }
    }

    /// Returns true if both headers describe the same block in the same chain position.
    pub fn matches(&self, other: &Self) -> bool {
        self.number == other.number &&
            self.hash == other.hash &&
            self.parent_hash == other.parent_hash
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for L1BlockHeader {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        Ok(Self {
            number: u.int_in_range(1..=u32::MAX)? as u64,
            hash: B256::arbitrary(u)?,
            parent_hash: B256::arbitrary(u)?,
            timestamp: u.arbitrary::<u32>()? as u64,
        })
    }
}

/// An L1 block together with the rollup events it emitted, grouped by kind.
///
/// The emission order across kinds is not kept here, it lives in the [`crate::BlockOrders`]
/// returned alongside the blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Block {
    /// The block header.
    pub header: L1BlockHeader,
    /// Global exit root updates.
    pub global_exit_roots: Vec<GlobalExitRoot>,
    /// L1 info tree leaves.
    pub l1_info_tree: Vec<L1InfoTreeLeaf>,
    /// Forced batches.
    pub forced_batches: Vec<ForcedBatch>,
    /// Sequences of batches, one entry per sequencing event.
    pub sequenced_batches: Vec<Vec<SequencedBatch>>,
    /// Verified batches.
    pub verified_batches: Vec<VerifiedBatch>,
    /// Sequences of forced batches, one entry per sequencing event.
    pub sequenced_force_batches: Vec<Vec<SequencedForceBatch>>,
    /// Fork id updates.
    pub fork_ids: Vec<ForkId>,
    /// The first etrog sequence, if emitted in this block.
    pub update_etrog_sequence: Option<UpdateEtrogSequence>,
}

impl L1Block {
    /// Returns an [`L1Block`] without events.
    pub fn new(header: L1BlockHeader) -> Self {
        Self { header, ..Default::default() }
    }

    /// The block number.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// The block hash.
    pub const fn hash(&self) -> B256 {
        self.header.hash
    }

    /// Returns the [`BlockInfo`] of the block.
    pub fn info(&self) -> BlockInfo {
        (&self.header).into()
    }

    /// Returns the batches carried by the event the order points at, if the event carries
    /// batches.
    pub fn sequence_for_order(&self, order: &Order) -> Option<BatchSequence> {
        let (first, last) = match order.name {
            EventOrder::SequenceBatches => {
                let sequence = self.sequenced_batches.get(order.pos)?;
                (sequence.first()?.batch_number, sequence.last()?.batch_number)
            }
            EventOrder::SequenceForceBatches => {
                let sequence = self.sequenced_force_batches.get(order.pos)?;
                (sequence.first()?.batch_number, sequence.last()?.batch_number)
            }
            EventOrder::UpdateEtrogSequence => {
                let sequence = self.update_etrog_sequence.as_ref()?;
                (sequence.batch_number, sequence.batch_number)
            }
            _ => return None,
        };
        Some(BatchSequence { from_batch_number: first, to_batch_number: last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequenced(batch_number: u64) -> SequencedBatch {
        SequencedBatch { batch_number, ..Default::default() }
    }

    #[test]
    fn test_sequence_for_order() {
        let mut block = L1Block::new(L1BlockHeader::new(10, B256::repeat_byte(1), B256::ZERO, 0));
        block.sequenced_batches.push(vec![sequenced(3), sequenced(4), sequenced(5)]);
        block.global_exit_roots.push(GlobalExitRoot::default());

        let sequence = block.sequence_for_order(&Order::new(EventOrder::SequenceBatches, 0));
        assert_eq!(sequence, Some(BatchSequence { from_batch_number: 3, to_batch_number: 5 }));

        assert_eq!(block.sequence_for_order(&Order::new(EventOrder::GlobalExitRoots, 0)), None);
        assert_eq!(block.sequence_for_order(&Order::new(EventOrder::SequenceBatches, 1)), None);
    }
}
