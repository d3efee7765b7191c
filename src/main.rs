mod config;
mod http;
mod protocol;
mod queue;
mod raft;
mod telemetry;

use mimalloc::MiMalloc;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;

use config::NodeConfig;
use queue::QueueManager;
use raft::RaftNode;

/// Create a shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler, continuing without it");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, continuing without it");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = NodeConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_tx_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_tx_signal).await;
    });

    let manager = QueueManager::new();
    let raft = RaftNode::new(
        config.node_id,
        config.node(),
        &config.data_dir,
        manager,
        config.bootstrap(),
    )
    .await?;

    start_raft_server(&raft, &config, &shutdown_tx).await?;
    run_api_server(&raft, &config, &shutdown_tx).await?;

    // Stop replication and elections before the process exits.
    raft.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

/// Start the internal raft RPC listener in the background.
async fn start_raft_server(
    raft: &Arc<RaftNode>,
    config: &NodeConfig,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(config.raft_listen_addr()).await?;
    let router = http::create_raft_router(Arc::clone(raft));
    let mut shutdown_rx = shutdown_tx.subscribe();

    info!(
        node_id = config.node_id,
        addr = %config.raft_listen_addr(),
        "Raft RPC listener ready"
    );

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
        {
            warn!(error = %e, "Raft RPC server error");
        }
    });

    Ok(())
}

/// Run the public HTTP API server until shutdown.
async fn run_api_server(
    raft: &Arc<RaftNode>,
    config: &NodeConfig,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(config.http_listen_addr()).await?;
    let router = http::create_router(Arc::clone(raft));
    let mut shutdown_rx = shutdown_tx.subscribe();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node_id = config.node_id,
        endpoint = %format!("http://{}", config.http_listen_addr()),
        "SimplyQ HTTP API ready"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}
