use alloy_primitives::B256;
use std::collections::HashMap;

/// The kind of a decoded rollup event, used to replay the events of a block in emission order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum EventOrder {
    /// A global exit root update.
    GlobalExitRoots,
    /// An L1 info tree leaf.
    L1InfoTree,
    /// A sequence of batches.
    SequenceBatches,
    /// The first sequence of the etrog fork.
    UpdateEtrogSequence,
    /// A forced batch.
    ForcedBatches,
    /// A verification from the trusted aggregator.
    TrustedVerifyBatch,
    /// A verification from any aggregator.
    VerifyBatch,
    /// A sequence of forced batches.
    SequenceForceBatches,
    /// A fork id update.
    ForkIds,
}

/// Points at the `pos`-th event of kind `name` inside an [`crate::L1Block`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Order {
    /// The event kind.
    pub name: EventOrder,
    /// The position in the block's list for the event kind.
    pub pos: usize,
}

impl Order {
    /// Returns a new instance of [`Order`].
    pub const fn new(name: EventOrder, pos: usize) -> Self {
        Self { name, pos }
    }
}

/// The emission order of the events of each block, keyed by block hash.
pub type BlockOrders = HashMap<B256, Vec<Order>>;

/// A contiguous run of batch numbers carried by a single event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchSequence {
    /// The first batch of the sequence.
    pub from_batch_number: u64,
    /// The last batch of the sequence.
    pub to_batch_number: u64,
}
