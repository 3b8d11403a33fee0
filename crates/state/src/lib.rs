//! The state store contract consumed by the L1 synchronizer, plus an in-memory implementation.

mod error;
pub use error::StateError;

mod memory;
pub use memory::{InMemoryState, InMemoryStateTx, DEFAULT_PROVER_ID};

mod models;
pub use models::{Batch, ProcessBatchRequest, ProcessBatchResponse, StoredFlushId, VirtualBatch};

mod store;
pub use store::{StateStore, StateTx};
