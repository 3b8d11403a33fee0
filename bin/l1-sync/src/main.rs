use clap::Parser;
use l1_sync_node::L1SyncNodeArgs;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Enable backtraces unless a RUST_BACKTRACE value has already been explicitly provided.
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = l1_sync_node::run(L1SyncNodeArgs::parse()).await {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
