//! L1 client ("etherman") used by the synchronizer to read rollup events from Ethereum.

pub mod abi;

mod error;
pub use error::{EthRequestError, EthermanError, FilterLogError};

mod etherman;
pub use etherman::{EthermanConfig, L1Etherman};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers
pub mod test_utils;

use l1_sync_primitives::{BlockOrders, DataCommittee, ForkIdInterval, L1Block, L1BlockHeader};

/// The rollup information retrieved for a range of L1 blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollupInfo {
    /// The blocks which emitted at least one rollup event, in ascending order.
    pub blocks: Vec<L1Block>,
    /// The emission order of the events of each block.
    pub orders: BlockOrders,
}

/// The L1 client interface the synchronizer depends on.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait EthermanClient: Send + Sync {
    /// Returns the header of the provided block, or of the latest block if `None`.
    async fn header_by_number(&self, number: Option<u64>) -> Result<L1BlockHeader, EthermanError>;

    /// Returns the rollup events emitted in `[from, to]`, up to the latest block if `to` is
    /// `None`.
    async fn get_rollup_info_by_block_range(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> Result<RollupInfo, EthermanError>;

    /// Returns the header of the provided block.
    async fn eth_block_by_number(&self, number: u64) -> Result<L1BlockHeader, EthermanError>;

    /// Returns the data availability committee currently registered on L1.
    async fn get_current_data_committee(&self) -> Result<DataCommittee, EthermanError>;

    /// Returns the number of the last sequenced batch.
    async fn get_latest_batch_number(&self) -> Result<u64, EthermanError>;

    /// Returns the URL of the trusted sequencer.
    async fn get_trusted_sequencer_url(&self) -> Result<String, EthermanError>;

    /// Returns true if the rollup contract was deployed exactly at the provided block.
    async fn verify_gen_block_number(&self, block_number: u64) -> Result<bool, EthermanError>;

    /// Returns the fork id intervals activated between the provided blocks.
    async fn get_forks(
        &self,
        genesis_block_number: u64,
        last_block_number: u64,
    ) -> Result<Vec<ForkIdInterval>, EthermanError>;
}
