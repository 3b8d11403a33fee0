use alloy_primitives::{Address, B256};

/// A member of the data availability committee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCommitteeMember {
    /// The member's signing address.
    pub addr: Address,
    /// The JSON-RPC endpoint of the member.
    pub url: String,
}

/// The data availability committee currently registered on L1.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataCommittee {
    /// The hash of the members list.
    pub address_hash: B256,
    /// The required amount of signatures.
    pub required_signatures: u64,
    /// The committee members.
    pub members: Vec<DataCommitteeMember>,
}
