//! spasaka entry point.
//!
//! Campaigns for leadership on the node-monitor lock and runs the
//! monitor while leadership holds. With `singleNode: true` the election
//! is a no-op and the monitor starts immediately.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use satrapy_client::Client;
use satrapy_controller::config::SpasakaConfig;
use satrapy_controller::monitor::NodeMonitor;
use satrapy_storage::election::{run_as_leader, Election, EtcdElection, NoopElection};
use satrapy_storage::EtcdStore;

const ELECTION_KEY: &str = "/locks/node-monitor";

#[derive(Debug, Parser)]
#[command(name = "spasaka", about = "satrapy cluster controller")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = SpasakaConfig::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let client = Arc::new(
        Client::new(
            &config.cluster.server,
            &config.cluster.token,
            Duration::from_secs(5),
        )
        .context("failed to build control-plane client")?,
    );

    let election: Box<dyn Election> = if config.single_node {
        info!(component = "spasaka", "single-node mode, skipping election");
        Box::new(NoopElection)
    } else {
        let store = EtcdStore::connect(&config.etcd.endpoints)
            .await
            .context("etcd connect failed")?;
        Box::new(EtcdElection::new(store.client().clone()))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));

    let monitor = NodeMonitor::new(
        client,
        Duration::from_secs(config.node_monitor_period_secs),
        config.node_monitor_grace_period_secs,
        config.concurrent_node_syncs,
    );

    info!(component = "spasaka", "started");

    // Re-campaign after losing a session, until shutdown.
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let result = run_as_leader(
            election.as_ref(),
            ELECTION_KEY,
            "spasaka",
            shutdown_rx.clone(),
            |leader_shutdown| monitor.run(leader_shutdown),
        )
        .await;

        match result {
            Ok(()) if *shutdown_rx.borrow() => break,
            Ok(()) => info!(component = "spasaka", "leadership ended, re-campaigning"),
            Err(e) => {
                error!(component = "spasaka", error = %e, "election failed, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    info!(component = "spasaka", "shutdown complete");
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

    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
