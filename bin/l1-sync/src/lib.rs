//! The L1 synchronizer node.

mod args;
pub use args::{ContractArgs, ExtControlArgs, L1ProviderArgs, L1SyncNodeArgs, SyncArgs};

mod constants;

use alloy_network::Ethereum;
use alloy_provider::{ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_transport::layers::RetryBackoffLayer;
use l1_sync::{
    ExtControl, RpcDataCommitteeClientFactory, RpcTrustedSequencerClient, Synchronizer,
    TrustedSequencerClient,
};
use l1_sync_etherman::{EthermanClient, L1Etherman};
use l1_sync_state::InMemoryState;
use std::sync::Arc;
use tokio::sync::watch;

/// The L1 client of the node.
pub type NodeEtherman = L1Etherman<RootProvider<Ethereum>>;

/// Returns an L1 client per configured URL, each with its own retry layer.
pub fn ethermans(args: &L1SyncNodeArgs) -> Vec<Arc<NodeEtherman>> {
    let provider_args = &args.l1_provider_args;
    provider_args
        .urls
        .iter()
        .map(|url| {
            let retry_layer = RetryBackoffLayer::new(
                provider_args.max_retries,
                provider_args.initial_backoff,
                provider_args.compute_units_per_second,
            );
            let client = RpcClient::builder().layer(retry_layer).http(url.clone());
            let provider = ProviderBuilder::<_, _, Ethereum>::default().connect_client(client);
            Arc::new(L1Etherman::new(provider, args.etherman_config()))
        })
        .collect()
}

/// Runs the synchronizer until ctrl-c is received or a fatal error occurs.
pub async fn run(args: L1SyncNodeArgs) -> eyre::Result<()> {
    let ethermans = ethermans(&args);
    let etherman = ethermans.first().cloned().ok_or_else(|| eyre::eyre!("no L1 url provided"))?;
    tracing::info!(target: "l1_sync::node", clients = ethermans.len(), "starting L1 synchronizer node");

    let trusted_sequencer = if args.sync_args.is_trusted_sequencer {
        None
    } else {
        let url = match args.sync_args.trusted_sequencer_url.clone() {
            Some(url) => url,
            None => etherman.get_trusted_sequencer_url().await?,
        };
        tracing::info!(target: "l1_sync::node", %url, "using trusted sequencer");
        Some(Arc::new(RpcTrustedSequencerClient::new(&url)?) as Arc<dyn TrustedSequencerClient>)
    };

    let mut synchronizer = Synchronizer::new(
        args.synchronizer_config(),
        InMemoryState::new(),
        ethermans,
        trusted_sequencer,
        Arc::new(RpcDataCommitteeClientFactory),
    )?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let ext_control = args.ext_control_args.enabled.then(|| {
        let ext_control =
            ExtControl::new(&args.ext_control_args.file, synchronizer.orchestrator_handle());
        tokio::spawn(ext_control.run_until_shutdown(async move {
            let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
        }))
    });

    let res = synchronizer
        .sync(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "l1_sync::node", %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!(target: "l1_sync::node", "received ctrl-c, shutting down");
        })
        .await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = ext_control {
        task.await?;
    }
    Ok(res?)
}
