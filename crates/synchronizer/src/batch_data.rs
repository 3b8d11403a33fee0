//! Retrieval of batch L2 data missing from the L1 sequence, for validium sequences which only
//! carry the hash of the data.

use crate::{BatchDataError, BatchDataSource};
use alloy_primitives::{keccak256, Bytes, B256, U64};
use alloy_rpc_client::RpcClient;
use l1_sync_etherman::EthermanClient;
use l1_sync_primitives::DataCommitteeMember;
use l1_sync_state::StateStore;
use parking_lot::Mutex;
use serde::Deserialize;
use std::{fmt::Debug, sync::Arc};

/// Provides the L2 data of a batch matching an expected hash.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait BatchDataProvider: Send + Sync + Debug {
    /// Returns the data of the batch whose keccak256 hash is `expected_hash`.
    async fn get_batch_l2_data(
        &self,
        batch_number: u64,
        expected_hash: B256,
    ) -> Result<Bytes, BatchDataError>;
}

/// A client of the trusted sequencer.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait TrustedSequencerClient: Send + Sync + Debug {
    /// Returns the L2 data of the batch.
    async fn batch_l2_data_by_number(&self, batch_number: u64) -> Result<Bytes, BatchDataError>;
}

/// A client of a data committee member.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait DataCommitteeClient: Send + Sync + Debug {
    /// Returns the data stored off chain under the hash.
    async fn get_off_chain_data(&self, hash: B256) -> Result<Bytes, BatchDataError>;
}

/// Builds the clients of the data committee members.
#[auto_impl::auto_impl(Arc)]
pub trait DataCommitteeClientFactory: Send + Sync + Debug {
    /// Returns a client for the member reachable at the url.
    fn new_client(&self, url: &str) -> Result<Arc<dyn DataCommitteeClient>, BatchDataError>;
}

#[derive(Debug, Default)]
struct CommitteeSelection {
    members: Vec<DataCommitteeMember>,
    selected: Option<usize>,
}

/// Looks up batch data in the local state, then asks the trusted sequencer, then the data
/// committee members in turn. Every candidate is checked against the expected hash.
#[derive(Debug)]
pub struct BatchDataRetriever<S, E> {
    state: S,
    etherman: Arc<E>,
    is_trusted_sequencer: bool,
    trusted_sequencer: Option<Arc<dyn TrustedSequencerClient>>,
    committee_clients: Arc<dyn DataCommitteeClientFactory>,
    committee: Mutex<CommitteeSelection>,
}

impl<S, E> BatchDataRetriever<S, E>
where
    S: StateStore + Debug,
    E: EthermanClient + Debug,
{
    /// Returns a new [`BatchDataRetriever`]. The trusted sequencer is never asked when this node is
    /// the trusted sequencer.
    pub fn new(
        state: S,
        etherman: Arc<E>,
        is_trusted_sequencer: bool,
        trusted_sequencer: Option<Arc<dyn TrustedSequencerClient>>,
        committee_clients: Arc<dyn DataCommitteeClientFactory>,
    ) -> Self {
        Self {
            state,
            etherman,
            is_trusted_sequencer,
            trusted_sequencer,
            committee_clients,
            committee: Default::default(),
        }
    }

    /// Reloads the committee from L1 and selects a random member to start from.
    pub async fn load_committee(&self) -> Result<(), BatchDataError> {
        let committee = self.etherman.get_current_data_committee().await?;
        let selected = (!committee.members.is_empty())
            .then(|| rand::random_range(0..committee.members.len()));
        tracing::debug!(target: "l1_sync::processor", members = committee.members.len(), ?selected, "loaded data committee");
        *self.committee.lock() = CommitteeSelection { members: committee.members, selected };
        Ok(())
    }

    async fn data_from_trusted_sequencer(
        &self,
        client: &dyn TrustedSequencerClient,
        batch_number: u64,
        expected_hash: B256,
    ) -> Result<Bytes, BatchDataError> {
        let data = client.batch_l2_data_by_number(batch_number).await?;
        check_hash(batch_number, BatchDataSource::TrustedSequencer, expected_hash, data)
    }

    async fn data_from_committee(
        &self,
        batch_number: u64,
        expected_hash: B256,
        tried: &mut Vec<BatchDataSource>,
    ) -> Result<Bytes, BatchDataError> {
        if self.committee.lock().selected.is_none() {
            self.load_committee().await?;
        }
        let (members, start) = {
            let committee = self.committee.lock();
            (committee.members.clone(), committee.selected)
        };

        if let Some(start) = start {
            for step in 0..members.len() {
                let index = (start + step) % members.len();
                let member = &members[index];
                let origin = BatchDataSource::Committee(member.url.clone());
                tried.push(origin.clone());
                tracing::debug!(target: "l1_sync::processor", batch_number, addr = %member.addr, url = member.url, "requesting data from committee member");

                let data = match self.committee_clients.new_client(&member.url) {
                    Ok(client) => client.get_off_chain_data(expected_hash).await,
                    Err(err) => Err(err),
                };
                match data.and_then(|data| check_hash(batch_number, origin, expected_hash, data)) {
                    Ok(data) => {
                        self.committee.lock().selected = Some(index);
                        return Ok(data)
                    }
                    Err(err) => {
                        tracing::warn!(target: "l1_sync::processor", batch_number, addr = %member.addr, url = member.url, %err, "failed to get data from committee member")
                    }
                }
            }
        }

        self.load_committee().await?;
        Err(BatchDataError::NotFound { batch_number, tried: std::mem::take(tried) })
    }
}

#[async_trait::async_trait]
impl<S, E> BatchDataProvider for BatchDataRetriever<S, E>
where
    S: StateStore + Debug,
    E: EthermanClient + Debug,
{
    async fn get_batch_l2_data(
        &self,
        batch_number: u64,
        expected_hash: B256,
    ) -> Result<Bytes, BatchDataError> {
        let mut tried = vec![BatchDataSource::Local];
        if let Some(data) = self.state.get_batch_l2_data(batch_number).await? {
            match check_hash(batch_number, BatchDataSource::Local, expected_hash, data) {
                Ok(data) => return Ok(data),
                Err(err) => tracing::warn!(target: "l1_sync::processor", %err, "local batch data does not match"),
            }
        }

        if !self.is_trusted_sequencer {
            if let Some(client) = &self.trusted_sequencer {
                tried.push(BatchDataSource::TrustedSequencer);
                match self.data_from_trusted_sequencer(client.as_ref(), batch_number, expected_hash).await
                {
                    Ok(data) => return Ok(data),
                    Err(err) => {
                        tracing::warn!(target: "l1_sync::processor", batch_number, %err, "failed to get data from trusted sequencer")
                    }
                }
            }
        }

        let res = self.data_from_committee(batch_number, expected_hash, &mut tried).await;
        if let Err(err) = &res {
            tracing::error!(target: "l1_sync::processor", batch_number, %err, "batch data not available");
        }
        res
    }
}

fn check_hash(
    batch_number: u64,
    origin: BatchDataSource,
    expected: B256,
    data: Bytes,
) -> Result<Bytes, BatchDataError> {
    let actual = keccak256(&data);
    if actual != expected {
        return Err(BatchDataError::HashMismatch { batch_number, origin, expected, actual });
    }
    Ok(data)
}

fn http_client(url: &str) -> Result<RpcClient, BatchDataError> {
    let url = url.parse::<reqwest::Url>().map_err(|_| BatchDataError::InvalidUrl(url.to_string()))?;
    Ok(RpcClient::new_http(url))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBatch {
    batch_l2_data: Bytes,
}

/// A [`TrustedSequencerClient`] over the zkEVM JSON-RPC API.
#[derive(Debug, Clone)]
pub struct RpcTrustedSequencerClient {
    client: RpcClient,
}

impl RpcTrustedSequencerClient {
    /// Returns a client for the trusted sequencer at the url.
    pub fn new(url: &str) -> Result<Self, BatchDataError> {
        Ok(Self { client: http_client(url)? })
    }
}

#[async_trait::async_trait]
impl TrustedSequencerClient for RpcTrustedSequencerClient {
    async fn batch_l2_data_by_number(&self, batch_number: u64) -> Result<Bytes, BatchDataError> {
        let batch: RpcBatch = self
            .client
            .request("zkevm_getBatchByNumber", (U64::from(batch_number), false))
            .await
            .map_err(|err| BatchDataError::Rpc {
                origin: BatchDataSource::TrustedSequencer,
                error: err.to_string(),
            })?;
        Ok(batch.batch_l2_data)
    }
}

/// A [`DataCommitteeClient`] over the data availability JSON-RPC API.
#[derive(Debug, Clone)]
pub struct RpcDataCommitteeClient {
    url: String,
    client: RpcClient,
}

#[async_trait::async_trait]
impl DataCommitteeClient for RpcDataCommitteeClient {
    async fn get_off_chain_data(&self, hash: B256) -> Result<Bytes, BatchDataError> {
        self.client.request("sync_getOffChainData", (hash,)).await.map_err(|err| {
            BatchDataError::Rpc {
                origin: BatchDataSource::Committee(self.url.clone()),
                error: err.to_string(),
            }
        })
    }
}

/// Builds [`RpcDataCommitteeClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcDataCommitteeClientFactory;

impl DataCommitteeClientFactory for RpcDataCommitteeClientFactory {
    fn new_client(&self, url: &str) -> Result<Arc<dyn DataCommitteeClient>, BatchDataError> {
        Ok(Arc::new(RpcDataCommitteeClient { url: url.to_string(), client: http_client(url)? }))
    }
}
