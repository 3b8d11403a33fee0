use alloy_primitives::{keccak256, Address, Bytes, B256};

/// A global exit root update emitted by the global exit root manager.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct GlobalExitRoot {
    /// The L1 block number the update was emitted at.
    pub block_number: u64,
    /// The mainnet exit root.
    pub mainnet_exit_root: B256,
    /// The rollup exit root.
    pub rollup_exit_root: B256,
    /// `keccak256(mainnet_exit_root ++ rollup_exit_root)`.
    pub global_exit_root: B256,
}

impl GlobalExitRoot {
    /// Returns a new [`GlobalExitRoot`], computing the combined root.
    pub fn new(block_number: u64, mainnet_exit_root: B256, rollup_exit_root: B256) -> Self {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(mainnet_exit_root.as_slice());
        buf[32..].copy_from_slice(rollup_exit_root.as_slice());
        Self { block_number, mainnet_exit_root, rollup_exit_root, global_exit_root: keccak256(buf) }
    }
}

/// A leaf of the L1 info tree.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct L1InfoTreeLeaf {
    /// The exit roots of the leaf.
    pub global_exit_root: GlobalExitRoot,
    /// The parent hash of the block that emitted the leaf.
    pub previous_block_hash: B256,
    /// The timestamp of the block that emitted the leaf.
    pub timestamp: u64,
}

/// A batch forced by a user through L1.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct ForcedBatch {
    /// The L1 block number the batch was forced at.
    pub block_number: u64,
    /// The forced batch number.
    pub forced_batch_number: u64,
    /// The address forcing the batch.
    pub sequencer: Address,
    /// The global exit root at the time of forcing.
    pub global_exit_root: B256,
    /// The raw batch transactions.
    pub raw_txs_data: Bytes,
    /// The timestamp of the block the batch was forced at.
    pub forced_at: u64,
}

/// A batch sequenced by the trusted sequencer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct SequencedBatch {
    /// The batch number.
    pub batch_number: u64,
    /// The address that sent the sequencing transaction.
    pub sequencer: Address,
    /// The sequencing transaction hash.
    pub tx_hash: B256,
    /// The nonce of the sequencing transaction.
    pub nonce: u64,
    /// The L2 coinbase.
    pub coinbase: Address,
    /// The L1 info root the batches were sequenced against.
    pub l1_info_root: Option<B256>,
    /// The hash of the batch L2 data.
    pub transactions_hash: B256,
    /// The batch L2 data, if it was posted on L1. Validium sequences only carry the hash.
    pub batch_l2_data: Option<Bytes>,
    /// The forced global exit root, zero when the batch was not forced.
    pub forced_global_exit_root: B256,
    /// The forced timestamp, zero when the batch was not forced.
    pub forced_timestamp: u64,
    /// The forced L1 block hash, zero when the batch was not forced.
    pub forced_block_hash_l1: B256,
    /// The maximum timestamp of the sequence, if provided.
    pub max_sequence_timestamp: Option<u64>,
}

/// A batch verified by an aggregator.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct VerifiedBatch {
    /// The L1 block number the verification was emitted at.
    pub block_number: u64,
    /// The verified batch number.
    pub batch_number: u64,
    /// The aggregator address.
    pub aggregator: Address,
    /// The state root after the batch.
    pub state_root: B256,
    /// The verification transaction hash.
    pub tx_hash: B256,
    /// Whether the verification came from the trusted aggregator.
    pub is_trusted: bool,
}

/// A sequence of previously forced batches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct SequencedForceBatch {
    /// The batch number.
    pub batch_number: u64,
    /// The L2 coinbase.
    pub coinbase: Address,
    /// The sequencing transaction hash.
    pub tx_hash: B256,
    /// The nonce of the sequencing transaction.
    pub nonce: u64,
    /// The timestamp of the block the sequence was emitted at.
    pub timestamp: u64,
    /// The batch L2 data.
    pub transactions: Bytes,
    /// The forced global exit root.
    pub forced_global_exit_root: B256,
}

/// A fork id update.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct ForkId {
    /// The last batch of the previous fork.
    pub batch_number: u64,
    /// The new fork id.
    pub fork_id: u64,
    /// The human readable version.
    pub version: String,
}

/// The first sequence of the etrog fork.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct UpdateEtrogSequence {
    /// The batch number.
    pub batch_number: u64,
    /// The address that sent the sequencing transaction.
    pub sequencer: Address,
    /// The sequencing transaction hash.
    pub tx_hash: B256,
    /// The nonce of the sequencing transaction.
    pub nonce: u64,
    /// The batch L2 data.
    pub transactions: Bytes,
    /// The forced global exit root.
    pub forced_global_exit_root: B256,
    /// The forced L1 block hash.
    pub forced_block_hash_l1: B256,
}

/// The interval of batches a fork id applies to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForkIdInterval {
    /// The first batch of the fork, inclusive.
    pub from_batch_number: u64,
    /// The last batch of the fork, inclusive. `u64::MAX` for the active fork.
    pub to_batch_number: u64,
    /// The fork id.
    pub fork_id: u64,
    /// The human readable version.
    pub version: String,
    /// The L1 block the fork was activated at.
    pub block_number: u64,
}

impl ForkIdInterval {
    /// Returns true if the batch belongs to the interval.
    pub const fn contains_batch(&self, batch_number: u64) -> bool {
        self.from_batch_number <= batch_number && batch_number <= self.to_batch_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_global_exit_root_hashes_both_roots() {
        let mainnet = b256!("0x0000000000000000000000000000000000000000000000000000000000000001");
        let rollup = b256!("0x0000000000000000000000000000000000000000000000000000000000000002");

        let ger = GlobalExitRoot::new(10, mainnet, rollup);

        assert_eq!(ger.global_exit_root, keccak256([mainnet.as_slice(), rollup.as_slice()].concat()));
        assert_ne!(ger.global_exit_root, GlobalExitRoot::new(10, rollup, mainnet).global_exit_root);
    }
}
