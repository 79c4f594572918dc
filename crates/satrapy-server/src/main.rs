//! apiserver entry point.
//!
//! Connects to etcd, wires the services, and serves the API with
//! graceful shutdown on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use satrapy_server::config::ApiServerConfig;
use satrapy_server::routes;
use satrapy_server::state::AppState;
use satrapy_storage::{EtcdStore, Store};

/// How long in-flight requests get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "apiserver", about = "satrapy control-plane API server")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ApiServerConfig::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let store = EtcdStore::connect(&config.etcd.endpoints)
        .await
        .context("etcd connect failed")?;
    store
        .readiness_check()
        .await
        .context("etcd is not healthy")?;

    let store: Arc<dyn Store> = Arc::new(store);
    let state = AppState::new(store, config.token.clone());
    let app = routes::router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(component = "apiserver", %addr, "apiserver started");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));

    let mut serve_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = serve_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // Block until the signal, then give in-flight connections a bounded
    // window to drain.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => joined
            .context("server task failed")?
            .context("server error")?,
        Err(_) => warn!("graceful shutdown exceeded the grace period, exiting"),
    }

    info!(component = "apiserver", "apiserver stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
