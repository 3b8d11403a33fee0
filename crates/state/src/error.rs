/// The error type for state operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The block was not found in the state.
    #[error("block {0} not found in state")]
    BlockNotFound(u64),
    /// A block was added that does not extend the stored chain.
    #[error("block {number} does not extend the last stored block {last}")]
    BlockOutOfOrder {
        /// The number of the block being added.
        number: u64,
        /// The number of the last stored block.
        last: u64,
    },
    /// The batch was not found in the state.
    #[error("batch {0} not found in state")]
    BatchNotFound(u64),
    /// The batch is closed and can not be modified.
    #[error("batch {0} is already closed")]
    BatchClosed(u64),
    /// The executor failed to process a batch.
    #[error("executor error: {0}")]
    Executor(String),
    /// The transaction could not be committed.
    #[error("failed to commit state transaction: {0}")]
    Commit(String),
}
