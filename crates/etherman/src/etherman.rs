use crate::{
    abi::{
        committeeHashCall, getAmountOfMembersCall, lastBatchSequencedCall, membersCall,
        requiredAmountOfSignaturesCall, sequenceBatchesValidiumCall, sequenceBatches_0Call,
        sequenceBatches_1Call, sequenceForceBatchesCall, trustedSequencerURLCall, ForceBatch,
        SequenceBatches, SequenceForceBatches, UpdateEtrogSequence as UpdateEtrogSequenceEvent,
        UpdateGlobalExitRoot, UpdateL1InfoTree, UpdateZkEVMVersion, VerifyBatches,
        VerifyBatchesTrustedAggregator, ROLLUP_EVENT_SIGNATURES,
    },
    error::EthermanResult,
    EthRequestError, EthermanClient, EthermanError, FilterLogError, RollupInfo,
};
use alloy_consensus::Transaction as _;
use alloy_eips::BlockId;
use alloy_network::{TransactionBuilder, TransactionResponse};
use alloy_primitives::{keccak256, Address, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, Log, Transaction, TransactionRequest};
use alloy_sol_types::{SolCall, SolEvent};
use l1_sync_primitives::{
    BlockOrders, DataCommittee, DataCommitteeMember, EventOrder, ForcedBatch, ForkId,
    ForkIdInterval, GlobalExitRoot, L1Block, L1BlockHeader, L1InfoTreeLeaf, Order,
    SequencedBatch, SequencedForceBatch, UpdateEtrogSequence, VerifiedBatch,
};

/// The addresses of the contracts the [`L1Etherman`] reads from.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct EthermanConfig {
    /// The rollup contract.
    pub rollup_address: Address,
    /// The global exit root manager contract.
    pub global_exit_root_manager_address: Address,
    /// The data availability committee contract.
    pub data_committee_address: Address,
}

/// An [`EthermanClient`] backed by an alloy [`Provider`].
#[derive(Debug)]
pub struct L1Etherman<P> {
    provider: P,
    config: EthermanConfig,
}

impl<P> L1Etherman<P>
where
    P: Provider,
{
    /// Returns a new [`L1Etherman`].
    pub const fn new(provider: P, config: EthermanConfig) -> Self {
        Self { provider, config }
    }

    /// Returns the header of the block, if it exists.
    async fn header(&self, id: BlockId) -> EthermanResult<Option<L1BlockHeader>> {
        Ok(self.provider.get_block(id).await?.map(|block| {
            L1BlockHeader::new(
                block.header.number,
                block.header.hash,
                block.header.parent_hash,
                block.header.timestamp,
            )
        }))
    }

    /// Performs a read-only call against the contract at `to`.
    async fn call<C: SolCall>(&self, to: Address, call: C) -> EthermanResult<C::Return> {
        let tx = TransactionRequest::default().with_to(to).with_input(call.abi_encode());
        let result = self.provider.call(tx).await?;
        C::abi_decode_returns(&result)
            .map_err(|error| EthermanError::DecodeCall { call: C::SIGNATURE, error })
    }

    /// Returns the transaction that emitted the log.
    async fn transaction(&self, log: &Log) -> EthermanResult<Transaction> {
        let tx_hash = log.transaction_hash.ok_or(FilterLogError::MissingTransactionHash)?;
        Ok(self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await?
            .ok_or(EthRequestError::MissingTransactionHash(tx_hash))?)
    }

    /// Returns the block the log belongs to, appending it to `blocks` if it is not the last one.
    async fn block_for_log<'a>(
        &self,
        blocks: &'a mut Vec<L1Block>,
        log: &Log,
    ) -> EthermanResult<&'a mut L1Block> {
        let number = log.block_number.ok_or(FilterLogError::MissingBlockNumber)?;
        let hash = log.block_hash.ok_or(FilterLogError::MissingBlockHash)?;

        let is_new_block = blocks.last().is_none_or(|b| b.hash() != hash || b.number() != number);
        if is_new_block {
            let header = self
                .header(BlockId::hash(hash))
                .await?
                .ok_or(EthRequestError::MissingBlockHash(hash))?;
            blocks.push(L1Block::new(header));
        }

        let last = blocks.len() - 1;
        Ok(&mut blocks[last])
    }

    /// Decodes the log and records it in the rollup info.
    async fn process_log(&self, log: &Log, info: &mut RollupInfo) -> EthermanResult<()> {
        let signature = *log.topics().first().ok_or(FilterLogError::MissingTopic)?;
        let RollupInfo { blocks, orders } = info;

        match signature {
            UpdateGlobalExitRoot::SIGNATURE_HASH => {
                let event = decode::<UpdateGlobalExitRoot>(log, "UpdateGlobalExitRoot")?;
                let block = self.block_for_log(blocks, log).await?;
                block.global_exit_roots.push(GlobalExitRoot::new(
                    block.number(),
                    event.mainnetExitRoot,
                    event.rollupExitRoot,
                ));
                push_order(orders, block, EventOrder::GlobalExitRoots, block.global_exit_roots.len());
            }
            UpdateL1InfoTree::SIGNATURE_HASH => {
                let event = decode::<UpdateL1InfoTree>(log, "UpdateL1InfoTree")?;
                let block = self.block_for_log(blocks, log).await?;
                block.l1_info_tree.push(L1InfoTreeLeaf {
                    global_exit_root: GlobalExitRoot::new(
                        block.number(),
                        event.mainnetExitRoot,
                        event.rollupExitRoot,
                    ),
                    previous_block_hash: block.header.parent_hash,
                    timestamp: block.header.timestamp,
                });
                push_order(orders, block, EventOrder::L1InfoTree, block.l1_info_tree.len());
            }
            SequenceBatches::SIGNATURE_HASH => {
                let event = decode::<SequenceBatches>(log, "SequenceBatches")?;
                let tx = self.transaction(log).await?;
                let base = SequencedBatch {
                    sequencer: tx.from(),
                    tx_hash: tx.tx_hash(),
                    nonce: tx.nonce(),
                    l1_info_root: Some(event.l1InfoRoot),
                    ..Default::default()
                };
                let sequences = if event.numBatch == 1 {
                    tracing::info!(target: "l1_sync::etherman", "initial transaction sequence");
                    vec![SequencedBatch { batch_number: 1, ..base }]
                } else {
                    decode_sequences(tx.input(), event.numBatch, &base)?
                };

                let block = self.block_for_log(blocks, log).await?;
                block.sequenced_batches.push(sequences);
                push_order(orders, block, EventOrder::SequenceBatches, block.sequenced_batches.len());
            }
            UpdateEtrogSequenceEvent::SIGNATURE_HASH => {
                let event = decode::<UpdateEtrogSequenceEvent>(log, "UpdateEtrogSequence")?;
                let tx = self.transaction(log).await?;
                let block = self.block_for_log(blocks, log).await?;
                block.update_etrog_sequence = Some(UpdateEtrogSequence {
                    batch_number: event.numBatch,
                    sequencer: event.sequencer,
                    tx_hash: tx.tx_hash(),
                    nonce: tx.nonce(),
                    transactions: event.transactions,
                    forced_global_exit_root: event.lastGlobalExitRoot,
                    forced_block_hash_l1: block.header.parent_hash,
                });
                push_order(orders, block, EventOrder::UpdateEtrogSequence, 1);
            }
            ForceBatch::SIGNATURE_HASH => {
                let event = decode::<ForceBatch>(log, "ForceBatch")?;
                let block = self.block_for_log(blocks, log).await?;
                block.forced_batches.push(ForcedBatch {
                    block_number: block.number(),
                    forced_batch_number: event.forceBatchNum,
                    sequencer: event.sequencer,
                    global_exit_root: event.lastGlobalExitRoot,
                    raw_txs_data: event.transactions,
                    forced_at: block.header.timestamp,
                });
                push_order(orders, block, EventOrder::ForcedBatches, block.forced_batches.len());
            }
            SequenceForceBatches::SIGNATURE_HASH => {
                let event = decode::<SequenceForceBatches>(log, "SequenceForceBatches")?;
                let tx = self.transaction(log).await?;
                let call = sequenceForceBatchesCall::abi_decode(tx.input())
                    .map_err(FilterLogError::DecodeCalldataFailed)?;

                let block = self.block_for_log(blocks, log).await?;
                let count = call.batches.len() as u64;
                let sequence = call
                    .batches
                    .into_iter()
                    .enumerate()
                    .map(|(i, batch)| SequencedForceBatch {
                        batch_number: event.numBatch.saturating_sub(count - 1 - i as u64),
                        coinbase: tx.from(),
                        tx_hash: tx.tx_hash(),
                        nonce: tx.nonce(),
                        timestamp: block.header.timestamp,
                        transactions: batch.transactions,
                        forced_global_exit_root: batch.forcedGlobalExitRoot,
                    })
                    .collect();
                block.sequenced_force_batches.push(sequence);
                push_order(
                    orders,
                    block,
                    EventOrder::SequenceForceBatches,
                    block.sequenced_force_batches.len(),
                );
            }
            VerifyBatchesTrustedAggregator::SIGNATURE_HASH | VerifyBatches::SIGNATURE_HASH => {
                let is_trusted = signature == VerifyBatchesTrustedAggregator::SIGNATURE_HASH;
                let (batch_number, state_root, aggregator) = if is_trusted {
                    let event = decode::<VerifyBatchesTrustedAggregator>(
                        log,
                        "VerifyBatchesTrustedAggregator",
                    )?;
                    (event.numBatch, event.stateRoot, event.aggregator)
                } else {
                    let event = decode::<VerifyBatches>(log, "VerifyBatches")?;
                    (event.numBatch, event.stateRoot, event.aggregator)
                };
                let tx_hash = log.transaction_hash.ok_or(FilterLogError::MissingTransactionHash)?;

                let block = self.block_for_log(blocks, log).await?;
                block.verified_batches.push(VerifiedBatch {
                    block_number: block.number(),
                    batch_number,
                    aggregator,
                    state_root,
                    tx_hash,
                    is_trusted,
                });
                let name =
                    if is_trusted { EventOrder::TrustedVerifyBatch } else { EventOrder::VerifyBatch };
                push_order(orders, block, name, block.verified_batches.len());
            }
            UpdateZkEVMVersion::SIGNATURE_HASH => {
                let event = decode::<UpdateZkEVMVersion>(log, "UpdateZkEVMVersion")?;
                let block = self.block_for_log(blocks, log).await?;
                block.fork_ids.push(ForkId {
                    batch_number: event.numBatch,
                    fork_id: event.forkID,
                    version: event.version,
                });
                push_order(orders, block, EventOrder::ForkIds, block.fork_ids.len());
            }
            _ => {
                tracing::warn!(target: "l1_sync::etherman", ?signature, "skipping unknown event");
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<P> EthermanClient for L1Etherman<P>
where
    P: Provider + 'static,
{
    async fn header_by_number(&self, number: Option<u64>) -> Result<L1BlockHeader, EthermanError> {
        let id = number.map_or(BlockId::latest(), BlockId::number);
        Ok(self
            .header(id)
            .await?
            .ok_or(EthRequestError::MissingBlock(number.unwrap_or_default()))?)
    }

    async fn get_rollup_info_by_block_range(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> Result<RollupInfo, EthermanError> {
        let filter = Filter::new()
            .address(vec![self.config.rollup_address, self.config.global_exit_root_manager_address])
            .event_signature(ROLLUP_EVENT_SIGNATURES.to_vec())
            .from_block(from)
            .to_block(to.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number));
        tracing::trace!(target: "l1_sync::etherman", ?filter, "fetching logs");

        let logs = self.provider.get_logs(&filter).await?;
        let mut info = RollupInfo::default();
        for log in &logs {
            self.process_log(log, &mut info).await?;
        }

        tracing::debug!(target: "l1_sync::etherman", from, ?to, logs = logs.len(), blocks = info.blocks.len(), "retrieved rollup info");
        Ok(info)
    }

    async fn eth_block_by_number(&self, number: u64) -> Result<L1BlockHeader, EthermanError> {
        Ok(self.header(BlockId::number(number)).await?.ok_or(EthRequestError::MissingBlock(number))?)
    }

    async fn get_current_data_committee(&self) -> Result<DataCommittee, EthermanError> {
        let address = self.config.data_committee_address;
        let address_hash = self.call(address, committeeHashCall {}).await?;
        let required_signatures = to_u64(
            self.call(address, requiredAmountOfSignaturesCall {}).await?,
            "requiredAmountOfSignatures",
        )?;
        let amount = to_u64(self.call(address, getAmountOfMembersCall {}).await?, "getAmountOfMembers")?;

        let mut members = Vec::with_capacity(amount as usize);
        for index in 0..amount {
            let member = self.call(address, membersCall { index: U256::from(index) }).await?;
            members.push(DataCommitteeMember { addr: member.addr, url: member.url });
        }

        Ok(DataCommittee { address_hash, required_signatures, members })
    }

    async fn get_latest_batch_number(&self) -> Result<u64, EthermanError> {
        self.call(self.config.rollup_address, lastBatchSequencedCall {}).await
    }

    async fn get_trusted_sequencer_url(&self) -> Result<String, EthermanError> {
        self.call(self.config.rollup_address, trustedSequencerURLCall {}).await
    }

    async fn verify_gen_block_number(&self, block_number: u64) -> Result<bool, EthermanError> {
        let address = self.config.rollup_address;
        let code = self.provider.get_code_at(address).block_id(BlockId::number(block_number)).await?;
        if code.is_empty() {
            return Ok(false);
        }
        if block_number == 0 {
            return Ok(true);
        }

        let previous_code =
            self.provider.get_code_at(address).block_id(BlockId::number(block_number - 1)).await?;
        Ok(previous_code.is_empty())
    }

    async fn get_forks(
        &self,
        genesis_block_number: u64,
        last_block_number: u64,
    ) -> Result<Vec<ForkIdInterval>, EthermanError> {
        let filter = Filter::new()
            .address(self.config.rollup_address)
            .event_signature(UpdateZkEVMVersion::SIGNATURE_HASH)
            .from_block(genesis_block_number)
            .to_block(last_block_number);
        let logs = self.provider.get_logs(&filter).await?;

        let mut forks = Vec::with_capacity(logs.len());
        for log in &logs {
            let event = decode::<UpdateZkEVMVersion>(log, "UpdateZkEVMVersion")?;
            let block_number = log.block_number.ok_or(FilterLogError::MissingBlockNumber)?;
            forks.push((
                block_number,
                ForkId { batch_number: event.numBatch, fork_id: event.forkID, version: event.version },
            ));
        }

        Ok(fork_intervals(forks))
    }
}

/// Decodes the log into the event `T`.
fn decode<T: SolEvent>(log: &Log, log_type: &'static str) -> EthermanResult<T> {
    Ok(T::decode_log(&log.inner)
        .map_err(|error| FilterLogError::DecodeLogFailed { log_type, error })?
        .data)
}

/// Records the last event of kind `name`, of which the block now holds `len`, in the block's
/// order list.
fn push_order(orders: &mut BlockOrders, block: &L1Block, name: EventOrder, len: usize) {
    orders.entry(block.hash()).or_default().push(Order::new(name, len.saturating_sub(1)));
}

/// Converts a contract return value to u64.
fn to_u64(value: U256, call: &'static str) -> EthermanResult<u64> {
    u64::try_from(value).map_err(|_| EthermanError::Overflow(call))
}

/// Decodes the batches of a sequencing transaction. `last_batch_number` is the number of the last
/// batch of the sequence, as emitted in the event.
pub(crate) fn decode_sequences(
    input: &[u8],
    last_batch_number: u64,
    base: &SequencedBatch,
) -> Result<Vec<SequencedBatch>, FilterLogError> {
    let selector: [u8; 4] = input
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(FilterLogError::UnknownMethod([0; 4]))?;

    let mut sequences: Vec<SequencedBatch> = match selector {
        sequenceBatches_0Call::SELECTOR => {
            let call = sequenceBatches_0Call::abi_decode(input)
                .map_err(FilterLogError::DecodeCalldataFailed)?;
            let coinbase = call.l2Coinbase;
            call.batches
                .into_iter()
                .map(|batch| SequencedBatch {
                    coinbase,
                    transactions_hash: keccak256(&batch.transactions),
                    batch_l2_data: Some(batch.transactions),
                    forced_global_exit_root: batch.forcedGlobalExitRoot,
                    forced_timestamp: batch.forcedTimestamp,
                    forced_block_hash_l1: batch.forcedBlockHashL1,
                    ..base.clone()
                })
                .collect()
        }
        sequenceBatches_1Call::SELECTOR => {
            let call = sequenceBatches_1Call::abi_decode(input)
                .map_err(FilterLogError::DecodeCalldataFailed)?;
            let (coinbase, max_timestamp) = (call.l2Coinbase, call.maxSequenceTimestamp);
            call.batches
                .into_iter()
                .map(|batch| SequencedBatch {
                    coinbase,
                    transactions_hash: keccak256(&batch.transactions),
                    batch_l2_data: Some(batch.transactions),
                    forced_global_exit_root: batch.forcedGlobalExitRoot,
                    forced_timestamp: batch.forcedTimestamp,
                    forced_block_hash_l1: batch.forcedBlockHashL1,
                    max_sequence_timestamp: Some(max_timestamp),
                    ..base.clone()
                })
                .collect()
        }
        sequenceBatchesValidiumCall::SELECTOR => {
            let call = sequenceBatchesValidiumCall::abi_decode(input)
                .map_err(FilterLogError::DecodeCalldataFailed)?;
            let (coinbase, max_timestamp) = (call.l2Coinbase, call.maxSequenceTimestamp);
            call.batches
                .into_iter()
                .map(|batch| SequencedBatch {
                    coinbase,
                    transactions_hash: batch.transactionsHash,
                    batch_l2_data: None,
                    forced_global_exit_root: batch.forcedGlobalExitRoot,
                    forced_timestamp: batch.forcedTimestamp,
                    forced_block_hash_l1: batch.forcedBlockHashL1,
                    max_sequence_timestamp: Some(max_timestamp),
                    ..base.clone()
                })
                .collect()
        }
        other => return Err(FilterLogError::UnknownMethod(other)),
    };

    let count = sequences.len() as u64;
    for (i, sequence) in sequences.iter_mut().enumerate() {
        sequence.batch_number = last_batch_number.saturating_sub(count - 1 - i as u64);
    }
    Ok(sequences)
}

/// Turns fork id updates, with the block they were emitted at, into consecutive intervals.
pub(crate) fn fork_intervals(forks: Vec<(u64, ForkId)>) -> Vec<ForkIdInterval> {
    let mut intervals: Vec<ForkIdInterval> = Vec::with_capacity(forks.len());
    for (block_number, fork) in forks {
        let from_batch_number = fork.batch_number + 1;
        if let Some(last) = intervals.last_mut() {
            if last.from_batch_number == from_batch_number {
                tracing::warn!(target: "l1_sync::etherman", ?fork, "fork id overrides the previous one");
                intervals.pop();
            } else {
                last.to_batch_number = fork.batch_number;
            }
        }
        intervals.push(ForkIdInterval {
            from_batch_number,
            to_batch_number: u64::MAX,
            fork_id: fork.fork_id,
            version: fork.version,
            block_number,
        });
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{BatchData, ValidiumBatchData};
    use alloy_primitives::{Bytes, B256};

    fn batch_data(transactions: &'static [u8]) -> BatchData {
        BatchData {
            transactions: Bytes::from_static(transactions),
            forcedGlobalExitRoot: B256::ZERO,
            forcedTimestamp: 0,
            forcedBlockHashL1: B256::ZERO,
        }
    }

    #[test]
    fn test_should_decode_elderberry_sequences() -> eyre::Result<()> {
        // Given
        let coinbase = Address::with_last_byte(7);
        let input = sequenceBatches_1Call {
            batches: vec![batch_data(b"first"), batch_data(b"second"), batch_data(b"third")],
            maxSequenceTimestamp: 1_000,
            initSequencedBatch: 9,
            l2Coinbase: coinbase,
        }
        .abi_encode();
        let base = SequencedBatch { nonce: 3, ..Default::default() };

        // When
        let sequences = decode_sequences(&input, 12, &base)?;

        // Then
        let numbers: Vec<_> = sequences.iter().map(|s| s.batch_number).collect();
        assert_eq!(numbers, vec![10, 11, 12]);
        assert!(sequences.iter().all(|s| s.coinbase == coinbase && s.nonce == 3));
        assert_eq!(sequences[1].batch_l2_data, Some(Bytes::from_static(b"second")));
        assert_eq!(sequences[1].transactions_hash, keccak256(b"second"));
        assert_eq!(sequences[0].max_sequence_timestamp, Some(1_000));
        Ok(())
    }

    #[test]
    fn test_should_decode_validium_sequences_without_data() -> eyre::Result<()> {
        // Given
        let hash = B256::repeat_byte(0xaa);
        let input = sequenceBatchesValidiumCall {
            batches: vec![ValidiumBatchData {
                transactionsHash: hash,
                forcedGlobalExitRoot: B256::ZERO,
                forcedTimestamp: 0,
                forcedBlockHashL1: B256::ZERO,
            }],
            maxSequenceTimestamp: 0,
            initSequencedBatch: 4,
            l2Coinbase: Address::ZERO,
            dataAvailabilityMessage: Bytes::new(),
        }
        .abi_encode();

        // When
        let sequences = decode_sequences(&input, 5, &SequencedBatch::default())?;

        // Then
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].batch_number, 5);
        assert_eq!(sequences[0].transactions_hash, hash);
        assert_eq!(sequences[0].batch_l2_data, None);
        Ok(())
    }

    #[test]
    fn test_should_reject_unknown_method() {
        let res = decode_sequences(&[1, 2, 3, 4, 5], 5, &SequencedBatch::default());
        assert!(matches!(res, Err(FilterLogError::UnknownMethod([1, 2, 3, 4]))));
    }

    #[test]
    fn test_fork_intervals() {
        // Given
        let fork = |batch_number, fork_id: u64| ForkId {
            batch_number,
            fork_id,
            version: format!("v{fork_id}"),
        };

        // When
        let intervals = fork_intervals(vec![(10, fork(0, 6)), (20, fork(100, 7)), (21, fork(100, 8))]);

        // Then
        assert_eq!(intervals.len(), 2);
        assert_eq!((intervals[0].from_batch_number, intervals[0].to_batch_number), (1, 100));
        assert_eq!(intervals[1].fork_id, 8);
        assert_eq!(intervals[1].from_batch_number, 101);
        assert_eq!(intervals[1].to_batch_number, u64::MAX);
        assert_eq!(intervals[1].block_number, 21);
    }
}
