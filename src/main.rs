use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use eth_tx_tracker::api::{ApiServer, QueryFacade};
use eth_tx_tracker::blockchain::{RpcClient, Tracker};
use eth_tx_tracker::config::{AppConfig, LoggingConfig};
use eth_tx_tracker::logging::{init_logging, ErrorLogger};
use eth_tx_tracker::store::Store;
use eth_tx_tracker::TrackerError;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Indexes Ethereum transactions for subscribed addresses and serves them over HTTP")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// HTTP port, overrides the configured value
    #[arg(long)]
    port: Option<u16>,

    /// JSON-RPC endpoint, overrides the configured value
    #[arg(long)]
    rpc_url: Option<String>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Config errors surface before logging is configured
            init_logging(&LoggingConfig::default());
            ErrorLogger::log_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), TrackerError> {
    if args.print_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let mut config = AppConfig::load_with_path(&args.config)?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(rpc_url) = args.rpc_url {
        config.rpc.endpoint = rpc_url;
    }
    config.validate()?;

    init_logging(&config.logging);
    log::info!("Starting transaction tracker against {}", config.rpc.endpoint);

    let store = Arc::new(Store::with_history_limit(config.tracker.max_history_per_address));
    let rpc_client = RpcClient::from_config(&config.rpc)?;
    let tracker = Tracker::from_config(rpc_client, Arc::clone(&store), &config);

    let shutdown = CancellationToken::new();
    let tracker_token = shutdown.child_token();
    let tracker_handle = tokio::spawn(async move { tracker.run(tracker_token).await });

    let server = ApiServer::from_config(QueryFacade::new(store), &config.api);
    let server_token = shutdown.clone();
    let served = server
        .start_with_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = server_token.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    if let Err(e) = tracker_handle.await {
        log::error!("Tracker task ended abnormally: {}", e);
    }

    served?;
    log::info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received shutdown signal (SIGINT)"),
                    _ = terminate.recv() => log::info!("Received shutdown signal (SIGTERM)"),
                }
                return;
            }
            Err(e) => log::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received shutdown signal (SIGINT)"),
        Err(e) => {
            log::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await
        }
    }
}
