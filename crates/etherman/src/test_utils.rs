use crate::{EthermanClient, EthermanError, RollupInfo};
use alloy_primitives::{keccak256, B256};
use l1_sync_primitives::{DataCommittee, ForkIdInterval, L1Block, L1BlockHeader, Order};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

/// Returns the deterministic hash the [`MockEtherman`] uses for the block.
pub fn mock_block_hash(number: u64) -> B256 {
    keccak256(number.to_be_bytes())
}

/// Returns the deterministic header the [`MockEtherman`] uses for the block.
pub fn mock_header(number: u64) -> L1BlockHeader {
    L1BlockHeader::new(
        number,
        mock_block_hash(number),
        mock_block_hash(number.saturating_sub(1)),
        number * 12,
    )
}

#[derive(Debug, Default)]
struct MockState {
    head: u64,
    head_failures: usize,
    blocks: BTreeMap<u64, (L1Block, Vec<Order>)>,
    headers: HashMap<u64, L1BlockHeader>,
    range_failures: HashMap<u64, usize>,
    range_delays: HashMap<u64, Duration>,
    requested_ranges: Vec<(u64, Option<u64>)>,
    data_committee: DataCommittee,
    trusted_sequencer_url: String,
    latest_batch_number: u64,
    forks: Vec<ForkIdInterval>,
    genesis_block_number: u64,
}

/// A scriptable [`EthermanClient`].
///
/// Blocks without scripted events resolve to [`mock_header`] unless a header override is set.
#[derive(Debug, Default)]
pub struct MockEtherman {
    state: Mutex<MockState>,
}

impl MockEtherman {
    /// Returns a new [`MockEtherman`] with the provided L1 head.
    pub fn new(head: u64) -> Self {
        let mock = Self::default();
        mock.set_head(head);
        mock
    }

    /// Sets the L1 head.
    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Makes the next `count` head requests fail.
    pub fn fail_head(&self, count: usize) {
        self.state.lock().head_failures = count;
    }

    /// Adds a block with rollup events and their emission order.
    pub fn add_block(&self, block: L1Block, orders: Vec<Order>) {
        self.state.lock().blocks.insert(block.number(), (block, orders));
    }

    /// Overrides the header returned for the block, as if L1 reorganized.
    pub fn set_header(&self, header: L1BlockHeader) {
        self.state.lock().headers.insert(header.number, header);
    }

    /// Makes the next `count` range requests starting at `from` fail.
    pub fn fail_range(&self, from: u64, count: usize) {
        self.state.lock().range_failures.insert(from, count);
    }

    /// Delays the responses to range requests starting at `from`.
    pub fn delay_range(&self, from: u64, delay: Duration) {
        self.state.lock().range_delays.insert(from, delay);
    }

    /// Returns the ranges requested so far.
    pub fn requested_ranges(&self) -> Vec<(u64, Option<u64>)> {
        self.state.lock().requested_ranges.clone()
    }

    /// Sets the data committee.
    pub fn set_data_committee(&self, committee: DataCommittee) {
        self.state.lock().data_committee = committee;
    }

    /// Sets the trusted sequencer URL.
    pub fn set_trusted_sequencer_url(&self, url: impl Into<String>) {
        self.state.lock().trusted_sequencer_url = url.into();
    }

    /// Sets the latest batch number.
    pub fn set_latest_batch_number(&self, batch_number: u64) {
        self.state.lock().latest_batch_number = batch_number;
    }

    /// Sets the fork id intervals.
    pub fn set_forks(&self, forks: Vec<ForkIdInterval>) {
        self.state.lock().forks = forks;
    }

    /// Sets the block the rollup contract was deployed at.
    pub fn set_genesis_block_number(&self, block_number: u64) {
        self.state.lock().genesis_block_number = block_number;
    }

    fn header(state: &MockState, number: u64) -> L1BlockHeader {
        state
            .headers
            .get(&number)
            .copied()
            .or_else(|| state.blocks.get(&number).map(|(b, _)| b.header))
            .unwrap_or_else(|| mock_header(number))
    }
}

#[async_trait::async_trait]
impl EthermanClient for MockEtherman {
    async fn header_by_number(&self, number: Option<u64>) -> Result<L1BlockHeader, EthermanError> {
        let mut state = self.state.lock();
        if state.head_failures > 0 {
            state.head_failures -= 1;
            return Err(EthermanError::Other("mock head failure".to_string()));
        }
        let number = number.unwrap_or(state.head);
        Ok(Self::header(&state, number))
    }

    async fn get_rollup_info_by_block_range(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> Result<RollupInfo, EthermanError> {
        let delay = {
            let mut state = self.state.lock();
            state.requested_ranges.push((from, to));
            if let Some(failures) = state.range_failures.get_mut(&from) {
                if *failures > 0 {
                    *failures -= 1;
                    return Err(EthermanError::Other(format!("mock range failure at {from}")));
                }
            }
            state.range_delays.get(&from).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        let to = to.unwrap_or(state.head);
        let mut info = RollupInfo::default();
        for (block, orders) in state.blocks.range(from..=to).map(|(_, b)| b) {
            info.orders.insert(block.hash(), orders.clone());
            info.blocks.push(block.clone());
        }
        Ok(info)
    }

    async fn eth_block_by_number(&self, number: u64) -> Result<L1BlockHeader, EthermanError> {
        Ok(Self::header(&self.state.lock(), number))
    }

    async fn get_current_data_committee(&self) -> Result<DataCommittee, EthermanError> {
        Ok(self.state.lock().data_committee.clone())
    }

    async fn get_latest_batch_number(&self) -> Result<u64, EthermanError> {
        Ok(self.state.lock().latest_batch_number)
    }

    async fn get_trusted_sequencer_url(&self) -> Result<String, EthermanError> {
        Ok(self.state.lock().trusted_sequencer_url.clone())
    }

    async fn verify_gen_block_number(&self, block_number: u64) -> Result<bool, EthermanError> {
        Ok(self.state.lock().genesis_block_number == block_number)
    }

    async fn get_forks(
        &self,
        _genesis_block_number: u64,
        _last_block_number: u64,
    ) -> Result<Vec<ForkIdInterval>, EthermanError> {
        Ok(self.state.lock().forks.clone())
    }
}
