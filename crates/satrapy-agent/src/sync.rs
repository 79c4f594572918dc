//! The reconciliation loop.
//!
//! One tick at a time, the sync manager diffs the apiserver's desired
//! inbounds against what the runtime actually serves and applies the
//! difference through four bounded worker pools: inbound creation,
//! inbound GC, user creation, user GC. Channels are buffered so a tick
//! does not block on a fast runtime; when the apiserver returns far more
//! work than the buffers hold, the tick blocks on send — intentional
//! backpressure, throttled by worker count.
//!
//! TTL expiry needs no special handling here: an expired row simply
//! stops appearing in the desired set, so the next tick sees the
//! runtime's copy as stray and garbage-collects it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use satrapy_client::Client;
use satrapy_core::proxy::{Inbound, InboundUser};

use crate::runtime::InboundRuntime;

/// Buffer size of every dispatch channel.
const CHANNEL_CAPACITY: usize = 256;

/// Resolves once `shutdown` carries `true` or its sender is dropped.
///
/// Equivalent to `shutdown.wait_for(|stop| *stop)` but never holds the
/// channel's `Ref` guard across an `.await`, which is required for the
/// returned future to stay `Send` when spawned.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Worker-pool sizes, one per channel.
#[derive(Debug, Clone, Copy)]
pub struct SyncWorkers {
    pub inbound: usize,
    pub inbound_gc: usize,
    pub user: usize,
    pub user_gc: usize,
}

/// Reconciles the local runtime against the apiserver's desired state.
pub struct SyncManager {
    client: Arc<Client>,
    runtime: Arc<dyn InboundRuntime>,
    node_name: String,
    sync_frequency: Duration,
    workers: SyncWorkers,
}

impl SyncManager {
    #[must_use]
    pub fn new(
        client: Arc<Client>,
        runtime: Arc<dyn InboundRuntime>,
        node_name: String,
        sync_frequency: Duration,
        workers: SyncWorkers,
    ) -> Self {
        Self {
            client,
            runtime,
            node_name,
            sync_frequency,
            workers,
        }
    }

    /// Run the tick loop until shutdown, then drain the pools.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let pools = Pools::spawn(
            self.client.clone(),
            self.runtime.clone(),
            self.node_name.clone(),
            self.workers,
        );

        let mut ticker = tokio::time::interval(self.sync_frequency);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(component = "syncManager", node = %self.node_name, "started");

        loop {
            tokio::select! {
                _ = wait_for_stop(&mut shutdown) => break,
                _ = ticker.tick() => self.tick(&pools).await,
            }
        }

        pools.shutdown().await;
        info!(component = "syncManager", node = %self.node_name, "stopped");
    }

    /// One full diff-and-dispatch pass.
    pub(crate) async fn tick(&self, pools: &Pools) {
        let desired = match self.client.get_inbounds(&self.node_name).await {
            Ok(desired) => desired,
            Err(e) => {
                error!(component = "syncManager", node = %self.node_name, error = %e,
                    "failed to get desired inbounds");
                return;
            }
        };

        let observed = match self.runtime.list_inbounds().await {
            Ok(observed) => observed,
            Err(e) => {
                error!(component = "syncManager", node = %self.node_name, error = %e,
                    "failed to list runtime inbounds");
                return;
            }
        };

        let desired_by_tag: HashMap<&str, &Inbound> = desired
            .iter()
            .map(|inbound| (inbound.spec.config.tag.as_str(), inbound))
            .collect();

        let creations = async {
            for inbound in &desired {
                if !observed.contains(&inbound.spec.config.tag) {
                    let _ = pools.create_inbound_tx.send(inbound.clone()).await;
                }
            }
        };

        let runtime_gc = async {
            for tag in &observed {
                if !desired_by_tag.contains_key(tag.as_str()) {
                    let _ = pools.gc_inbound_tx.send(tag.clone()).await;
                }
            }
        };

        let user_diff = async {
            for inbound in &desired {
                let tag = inbound.spec.config.tag.as_str();
                if !observed.contains(tag) {
                    // Freshly created this tick; its users are enqueued
                    // by the create-inbound worker once the runtime has
                    // the handler.
                    continue;
                }
                self.diff_users(tag, pools).await;
            }
        };

        tokio::join!(creations, runtime_gc, user_diff);
    }

    async fn diff_users(&self, tag: &str, pools: &Pools) {
        let desired_users = match self.client.get_inbound_users(&self.node_name, tag).await {
            Ok(users) => users,
            Err(e) => {
                error!(component = "syncManager", node = %self.node_name, tag, error = %e,
                    "failed to get desired users");
                return;
            }
        };

        let observed_users = match self.runtime.list_users(tag).await {
            Ok(users) => users,
            Err(e) => {
                error!(component = "syncManager", node = %self.node_name, tag, error = %e,
                    "failed to list runtime users");
                return;
            }
        };

        let desired_by_email: HashSet<&str> = desired_users
            .iter()
            .map(|user| user.spec.email.as_str())
            .collect();

        for user in &desired_users {
            if !observed_users.contains(&user.spec.email) {
                let _ = pools.create_user_tx.send(user.clone()).await;
            }
        }

        for email in &observed_users {
            if !desired_by_email.contains(email.as_str()) {
                let _ = pools
                    .gc_user_tx
                    .send((tag.to_owned(), email.clone()))
                    .await;
            }
        }
    }
}

/// The four dispatch channels and their worker pools.
///
/// Workers share a receiver behind a mutex and drain it until every
/// sender is gone, so dropping the senders is the shutdown signal.
pub(crate) struct Pools {
    create_inbound_tx: mpsc::Sender<Inbound>,
    gc_inbound_tx: mpsc::Sender<String>,
    create_user_tx: mpsc::Sender<InboundUser>,
    gc_user_tx: mpsc::Sender<(String, String)>,
    inbound_handles: Vec<JoinHandle<()>>,
    user_handles: Vec<JoinHandle<()>>,
}

impl Pools {
    pub(crate) fn spawn(
        client: Arc<Client>,
        runtime: Arc<dyn InboundRuntime>,
        node_name: String,
        workers: SyncWorkers,
    ) -> Self {
        let (create_inbound_tx, create_inbound_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);
        let (gc_inbound_tx, gc_inbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (create_user_tx, create_user_rx) = mpsc::channel::<InboundUser>(CHANNEL_CAPACITY);
        let (gc_user_tx, gc_user_rx) = mpsc::channel::<(String, String)>(CHANNEL_CAPACITY);

        let create_inbound_rx = Arc::new(Mutex::new(create_inbound_rx));
        let gc_inbound_rx = Arc::new(Mutex::new(gc_inbound_rx));
        let create_user_rx = Arc::new(Mutex::new(create_user_rx));
        let gc_user_rx = Arc::new(Mutex::new(gc_user_rx));

        let mut inbound_handles = Vec::with_capacity(workers.inbound + workers.inbound_gc);
        let mut user_handles = Vec::with_capacity(workers.user + workers.user_gc);

        for _ in 0..workers.inbound.max(1) {
            inbound_handles.push(tokio::spawn(create_inbound_worker(
                client.clone(),
                runtime.clone(),
                node_name.clone(),
                create_inbound_rx.clone(),
                create_user_tx.clone(),
            )));
        }

        for _ in 0..workers.inbound_gc.max(1) {
            inbound_handles.push(tokio::spawn(gc_inbound_worker(
                runtime.clone(),
                node_name.clone(),
                gc_inbound_rx.clone(),
            )));
        }

        for _ in 0..workers.user.max(1) {
            user_handles.push(tokio::spawn(create_user_worker(
                runtime.clone(),
                node_name.clone(),
                create_user_rx.clone(),
            )));
        }

        for _ in 0..workers.user_gc.max(1) {
            user_handles.push(tokio::spawn(gc_user_worker(
                runtime.clone(),
                node_name.clone(),
                gc_user_rx.clone(),
            )));
        }

        Self {
            create_inbound_tx,
            gc_inbound_tx,
            create_user_tx,
            gc_user_tx,
            inbound_handles,
            user_handles,
        }
    }

    /// Close the channels and wait for the workers to drain. The inbound
    /// pools go first: create-inbound workers hold user senders, so the
    /// user channels only close once they are done.
    pub(crate) async fn shutdown(self) {
        drop(self.create_inbound_tx);
        drop(self.gc_inbound_tx);
        for handle in self.inbound_handles {
            let _ = handle.await;
        }

        drop(self.create_user_tx);
        drop(self.gc_user_tx);
        for handle in self.user_handles {
            let _ = handle.await;
        }
    }
}

async fn create_inbound_worker(
    client: Arc<Client>,
    runtime: Arc<dyn InboundRuntime>,
    node_name: String,
    rx: Arc<Mutex<mpsc::Receiver<Inbound>>>,
    create_user_tx: mpsc::Sender<InboundUser>,
) {
    loop {
        let inbound = { rx.lock().await.recv().await };
        let Some(inbound) = inbound else { break };
        let tag = inbound.spec.config.tag.clone();

        if let Err(e) = runtime.add_inbound(&inbound.spec.config).await {
            if e.is_conflict() {
                debug!(component = "syncManager", node = %node_name, tag = %tag,
                    "inbound already present");
            } else {
                error!(component = "syncManager", resource = "inbound", action = "create",
                    node = %node_name, tag = %tag, error = %e, "failed");
                continue;
            }
        }

        // The inbound exists now; materialise its desired users.
        match client.get_inbound_users(&node_name, &tag).await {
            Ok(users) => {
                for user in users {
                    let _ = create_user_tx.send(user).await;
                }
            }
            Err(e) => {
                error!(component = "syncManager", node = %node_name, tag = %tag, error = %e,
                    "failed to fetch users for fresh inbound");
            }
        }
    }
}

async fn gc_inbound_worker(
    runtime: Arc<dyn InboundRuntime>,
    node_name: String,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
) {
    loop {
        let tag = { rx.lock().await.recv().await };
        let Some(tag) = tag else { break };

        if let Err(e) = runtime.remove_inbound(&tag).await {
            if e.is_not_found() {
                debug!(component = "syncManager", node = %node_name, tag = %tag, "already gone");
            } else {
                error!(component = "syncManager", resource = "inbound", action = "delete",
                    node = %node_name, tag = %tag, error = %e, "failed");
            }
        }
    }
}

async fn create_user_worker(
    runtime: Arc<dyn InboundRuntime>,
    node_name: String,
    rx: Arc<Mutex<mpsc::Receiver<InboundUser>>>,
) {
    loop {
        let user = { rx.lock().await.recv().await };
        let Some(user) = user else { break };
        let tag = user.spec.inbound_tag.clone();
        let email = user.spec.email.clone();

        let account = match user.account() {
            Ok(account) => account,
            Err(e) => {
                error!(component = "syncManager", resource = "user", node = %node_name,
                    tag = %tag, email = %email, error = %e, "unparseable account");
                continue;
            }
        };

        if let Err(e) = runtime.add_user(&tag, &email, &account).await {
            if e.is_conflict() {
                debug!(component = "syncManager", node = %node_name, tag = %tag,
                    email = %email, "user already present");
            } else {
                error!(component = "syncManager", resource = "user", action = "create",
                    node = %node_name, tag = %tag, email = %email, error = %e, "failed");
            }
        }
    }
}

async fn gc_user_worker(
    runtime: Arc<dyn InboundRuntime>,
    node_name: String,
    rx: Arc<Mutex<mpsc::Receiver<(String, String)>>>,
) {
    loop {
        let item = { rx.lock().await.recv().await };
        let Some((tag, email)) = item else { break };

        if let Err(e) = runtime.remove_user(&tag, &email).await {
            if e.is_not_found() {
                debug!(component = "syncManager", node = %node_name, tag = %tag,
                    email = %email, "already gone");
            } else {
                error!(component = "syncManager", resource = "user", action = "delete",
                    node = %node_name, tag = %tag, email = %email, error = %e, "failed");
            }
        }
    }
}
