//! satrap entry point.
//!
//! Wires the runtime adapter, the control-plane client, and the three
//! agent loops, each gated by a host-scoped file lock so a second local
//! satrap cannot double-drive the runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use satrapy_agent::config::SatrapConfig;
use satrapy_agent::flock::Flock;
use satrapy_agent::heartbeat::HeartbeatManager;
use satrapy_agent::register::RegisterManager;
use satrapy_agent::runtime::{InboundRuntime, XrayRuntime};
use satrapy_agent::server::{self, AgentState};
use satrapy_agent::sync::{SyncManager, SyncWorkers};
use satrapy_client::Client;
use satrapy_core::meta::{ObjectMeta, LABEL_ARCH, LABEL_HOSTNAME, LABEL_OS};
use satrapy_core::node::{Node, NodeCapacity, NodeSpec, NodeStatus};

#[derive(Debug, Parser)]
#[command(name = "satrap", about = "satrapy node agent")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = SatrapConfig::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let node_name = config
        .node_name()
        .context("node name not configured and system hostname unavailable")?;

    let runtime: Arc<dyn InboundRuntime> = Arc::new(
        XrayRuntime::connect(
            &config.xray.address,
            config.xray.port,
            satrapy_agent::runtime::DEFAULT_CALL_TIMEOUT,
        )
        .context("failed to build xray client")?,
    );

    let client = Arc::new(
        Client::new(
            &config.cluster.server,
            &config.cluster.token,
            Duration::from_secs(5),
        )
        .context("failed to build control-plane client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));

    // First-boot registration, gated so only one local process does it.
    if config.register_node {
        let mut rlock = Flock::new(format!("/tmp/satrap-register-{node_name}.lock"));
        if rlock.try_lock().is_ok() {
            let mut labels = std::collections::BTreeMap::new();
            labels.insert(LABEL_HOSTNAME.to_owned(), node_name.clone());
            labels.insert(LABEL_OS.to_owned(), std::env::consts::OS.to_owned());
            labels.insert(LABEL_ARCH.to_owned(), std::env::consts::ARCH.to_owned());
            labels.extend(config.labels.clone());

            let node = Node {
                metadata: ObjectMeta {
                    name: node_name.clone(),
                    labels,
                    ..ObjectMeta::default()
                },
                spec: NodeSpec {
                    token: config.token.clone(),
                },
                ..Node::default()
            };

            // Blocks until registered; the agent is useless unregistered.
            RegisterManager::new(client.clone())
                .register(shutdown_rx.clone(), &node)
                .await
                .context("node registration failed")?;
        } else {
            warn!(component = "registerManager", "lock held elsewhere, skipping registration");
        }
    }

    let node_status = NodeStatus {
        addresses: config.addresses.clone(),
        capacity: NodeCapacity {
            max_inbounds: config.max_inbounds,
        },
        connection_config: config.connection.clone(),
        ready: true,
        last_heartbeat_time: None,
    };

    let mut tasks = Vec::new();

    let mut hlock = Flock::new(format!("/tmp/satrap-heartbeat-{node_name}.lock"));
    if hlock.try_lock().is_ok() {
        let mut heartbeat = HeartbeatManager::new(
            client.clone(),
            node_name.clone(),
            Duration::from_secs(config.node_status_update_frequency_secs),
            node_status,
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { heartbeat.run(rx).await }));
    } else {
        warn!(component = "heartbeatManager", "lock held elsewhere, not starting");
    }

    let mut slock = Flock::new(format!("/tmp/satrap-sync-{node_name}.lock"));
    if slock.try_lock().is_ok() {
        let sync = SyncManager::new(
            client.clone(),
            runtime.clone(),
            node_name.clone(),
            Duration::from_secs(config.sync_frequency_secs),
            SyncWorkers {
                inbound: config.concurrent_inbound_syncs,
                inbound_gc: config.concurrent_inbound_gc_syncs,
                user: config.concurrent_user_syncs,
                user_gc: config.concurrent_user_gc_syncs,
            },
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { sync.run(rx).await }));
    } else {
        warn!(component = "syncManager", "lock held elsewhere, not starting");
    }

    // The operator surface.
    let state = Arc::new(AgentState {
        runtime,
        token: config.token.clone(),
    });
    let app = server::router(state);
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(component = "satrap", node = %node_name, %addr, "started");

    let mut serve_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("agent surface error")?;

    // Give the loops a bounded window to drain.
    for task in tasks {
        let _ = tokio::time::timeout(Duration::from_secs(10), task).await;
    }

    hlock.unlock();
    slock.unlock();

    info!(component = "satrap", node = %node_name, "stopped");
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
