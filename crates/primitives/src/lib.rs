//! Primitive types for the L1 synchronizer.

pub use block::{BlockInfo, L1Block, L1BlockHeader};
mod block;

pub use committee::{DataCommittee, DataCommitteeMember};
mod committee;

pub use events::{
    ForcedBatch, ForkId, ForkIdInterval, GlobalExitRoot, L1InfoTreeLeaf, SequencedBatch,
    SequencedForceBatch, UpdateEtrogSequence, VerifiedBatch,
};
mod events;

pub use order::{BatchSequence, BlockOrders, EventOrder, Order};
mod order;

pub use range::BlockRange;
mod range;
