//! Leader election over the store's lease/session primitive.
//!
//! A [`Session`] is a renewable etcd lease kept alive in the background;
//! if the keep-alive stream breaks, the session is lost and every watcher
//! is notified. [`EtcdElection`] campaigns on a well-known key under a
//! session; only the winner returns from `campaign`. [`NoopElection`] is
//! the single-node substitute: it grants leadership immediately and never
//! loses it.

use std::time::Duration;

use etcd_client::{Client, LeaderKey, ResignOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::StorageError;

/// Session lease TTL.
pub const SESSION_TTL_SECS: i64 = 10;

/// Budget for the best-effort resign on the way out, so a successor can
/// take over without waiting for the old lease to lapse.
const RESIGN_TIMEOUT: Duration = Duration::from_secs(2);

/// A renewable lease bound to this process.
pub struct Session {
    client: Client,
    lease_id: i64,
    lost_rx: watch::Receiver<bool>,
    keepalive: JoinHandle<()>,
}

impl Session {
    /// Grant a lease of `ttl_secs` and start renewing it in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Election`] when the grant or the
    /// keep-alive stream cannot be established.
    pub async fn new(client: Client, ttl_secs: i64) -> Result<Self, StorageError> {
        let mut c = client.clone();
        let lease = c
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| StorageError::Election {
                key: String::new(),
                reason: format!("lease grant failed: {e}"),
            })?;
        let lease_id = lease.id();

        let (mut keeper, mut stream) =
            c.lease_keep_alive(lease_id)
                .await
                .map_err(|e| StorageError::Election {
                    key: String::new(),
                    reason: format!("keep-alive failed: {e}"),
                })?;

        let (lost_tx, lost_rx) = watch::channel(false);
        let period = Duration::from_secs(u64::try_from(ttl_secs / 3).unwrap_or(1).max(1));

        let keepalive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if keeper.keep_alive().await.is_err() {
                    let _ = lost_tx.send(true);
                    return;
                }
                match stream.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => {}
                    _ => {
                        let _ = lost_tx.send(true);
                        return;
                    }
                }
            }
        });

        Ok(Self {
            client,
            lease_id,
            lost_rx,
            keepalive,
        })
    }

    /// The lease backing this session.
    #[must_use]
    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }

    /// A receiver that flips to `true` when the session is lost.
    #[must_use]
    pub fn lost(&self) -> watch::Receiver<bool> {
        self.lost_rx.clone()
    }

    /// Stop renewing and revoke the lease, best-effort.
    pub async fn close(self) {
        self.keepalive.abort();
        let mut client = self.client.clone();
        if let Err(e) = client.lease_revoke(self.lease_id).await {
            warn!(error = %e, "lease revoke failed on session close");
        }
    }
}

/// Held leadership: watch for session loss, resign when done.
pub struct Leadership {
    lost: watch::Receiver<bool>,
    etcd: Option<EtcdLeadership>,
    // Keeps the never-firing loss channel open for the no-op arm.
    _noop_tx: Option<watch::Sender<bool>>,
}

struct EtcdLeadership {
    client: Client,
    leader: LeaderKey,
    session: Session,
}

impl Leadership {
    /// A receiver that flips to `true` when the backing session dies.
    #[must_use]
    pub fn session_lost(&self) -> watch::Receiver<bool> {
        self.lost.clone()
    }

    /// Best-effort resign with a 2 s budget, then close the session.
    pub async fn resign(self) {
        if let Some(held) = self.etcd {
            let mut client = held.client.clone();
            let options = ResignOptions::new().with_leader(held.leader);
            if tokio::time::timeout(RESIGN_TIMEOUT, client.resign(Some(options)))
                .await
                .is_err()
            {
                warn!("resign timed out");
            }
            held.session.close().await;
        }
    }
}

/// The election primitive: blocks in `campaign` until this process holds
/// the named lock.
#[async_trait::async_trait]
pub trait Election: Send + Sync {
    /// Campaign on `key` with the given identity. Returns once this
    /// process is the leader. Cancel by dropping the future.
    async fn campaign(&self, key: &str, identity: &str) -> Result<Leadership, StorageError>;
}

/// Election over an etcd cluster; each campaign opens its own session.
pub struct EtcdElection {
    client: Client,
    session_ttl_secs: i64,
}

impl EtcdElection {
    /// Build an election sharing the store's client connection.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            session_ttl_secs: SESSION_TTL_SECS,
        }
    }
}

#[async_trait::async_trait]
impl Election for EtcdElection {
    async fn campaign(&self, key: &str, identity: &str) -> Result<Leadership, StorageError> {
        let session = Session::new(self.client.clone(), self.session_ttl_secs).await?;
        let lost = session.lost();

        let mut client = self.client.clone();
        let resp = client
            .campaign(key, identity, session.lease_id())
            .await
            .map_err(|e| StorageError::Election {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        let leader = resp.leader().cloned().ok_or_else(|| StorageError::Election {
            key: key.to_owned(),
            reason: "campaign returned no leader key".to_owned(),
        })?;

        Ok(Leadership {
            lost,
            etcd: Some(EtcdLeadership {
                client: self.client.clone(),
                leader,
                session,
            }),
            _noop_tx: None,
        })
    }
}

/// Single-node deployments skip consensus entirely: leadership is granted
/// immediately and the session never drops.
pub struct NoopElection;

#[async_trait::async_trait]
impl Election for NoopElection {
    async fn campaign(&self, _key: &str, _identity: &str) -> Result<Leadership, StorageError> {
        let (tx, rx) = watch::channel(false);
        Ok(Leadership {
            lost: rx,
            etcd: None,
            _noop_tx: Some(tx),
        })
    }
}

/// Campaign on `key`, run `body` while leadership holds, then resign.
///
/// The body receives a derived shutdown receiver that fires when either
/// the caller's `shutdown` fires or the session is lost. Returns without
/// running the body when `shutdown` fires during the campaign.
pub async fn run_as_leader<E, F, Fut>(
    election: &E,
    key: &str,
    identity: &str,
    mut shutdown: watch::Receiver<bool>,
    body: F,
) -> Result<(), StorageError>
where
    E: Election + ?Sized,
    F: FnOnce(watch::Receiver<bool>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    info!(key, identity, "campaigning for leadership");

    let leadership = tokio::select! {
        res = election.campaign(key, identity) => res?,
        _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
    };

    info!(key, identity, "became leader");

    let (body_tx, body_rx) = watch::channel(false);
    let mut lost = leadership.session_lost();
    let mut parent = shutdown.clone();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = parent.wait_for(|stop| *stop) => {}
            res = lost.wait_for(|lost| *lost) => {
                if res.is_ok() {
                    warn!("session lost, stepping down");
                }
            }
        }
        let _ = body_tx.send(true);
    });

    body(body_rx).await;

    watcher.abort();
    leadership.resign().await;
    info!(key, "stepped down from leadership");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_election_grants_immediately() {
        let leadership = NoopElection.campaign("/locks/x", "me").await.unwrap();
        assert!(!*leadership.session_lost().borrow());
        leadership.resign().await;
    }

    #[tokio::test]
    async fn run_as_leader_runs_body_and_returns() {
        let (_tx, shutdown) = watch::channel(false);
        let mut ran = false;
        run_as_leader(&NoopElection, "/locks/x", "me", shutdown, |_stop| async {
            ran = true;
        })
        .await
        .unwrap();
        assert!(ran);
    }

    #[tokio::test]
    async fn run_as_leader_skips_body_when_already_shut_down() {
        let (tx, shutdown) = watch::channel(false);
        tx.send(true).unwrap();

        struct Stuck;
        #[async_trait::async_trait]
        impl Election for Stuck {
            async fn campaign(&self, _: &str, _: &str) -> Result<Leadership, StorageError> {
                std::future::pending().await
            }
        }

        let mut ran = false;
        run_as_leader(&Stuck, "/locks/x", "me", shutdown, |_stop| async {
            ran = true;
        })
        .await
        .unwrap();
        assert!(!ran);
    }

    #[tokio::test]
    async fn body_shutdown_fires_on_parent_shutdown() {
        let (tx, shutdown) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_as_leader(&NoopElection, "/locks/x", "me", shutdown, |mut stop| async move {
                let _ = stop.wait_for(|s| *s).await;
            })
            .await
        });

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
