//! End-to-end API tests.
//!
//! Each test spins up the full router on an ephemeral port over an
//! in-memory store and drives it through the typed client — the same
//! path agents and controllers use in production.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use satrapy_client::{Client, DEFAULT_TIMEOUT};
use satrapy_core::meta::{now_second, ObjectMeta};
use satrapy_core::node::{Node, NodeCapacity, NodeStatus};
use satrapy_core::proxy::{
    AccountType, Inbound, InboundCapacity, InboundConfig, InboundSpec, InboundUser,
    InboundUserSpec,
};
use satrapy_core::Error;
use satrapy_server::routes;
use satrapy_server::state::AppState;
use satrapy_storage::MemoryStore;

const TOKEN: &str = "test-cluster-token";

async fn spawn_server() -> (String, Client) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, TOKEN.to_owned());
    let app = routes::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let address = format!("http://{addr}");
    let client = Client::new(&address, TOKEN, DEFAULT_TIMEOUT).unwrap();
    (address, client)
}

fn node(name: &str, max_inbounds: u32) -> Node {
    Node {
        metadata: ObjectMeta {
            name: name.to_owned(),
            ..ObjectMeta::default()
        },
        status: NodeStatus {
            ready: true,
            capacity: NodeCapacity { max_inbounds },
            ..NodeStatus::default()
        },
        ..Node::default()
    }
}

fn inbound(tag: &str, max_users: u32, ttl_secs: u64) -> Inbound {
    Inbound {
        spec: InboundSpec {
            capacity: InboundCapacity { max_users },
            config: InboundConfig {
                tag: tag.to_owned(),
                port: Some(443),
                protocol: Some("vless".to_owned()),
                ..InboundConfig::default()
            },
            ttl_secs,
        },
        ..Inbound::default()
    }
}

fn user(email: &str) -> InboundUser {
    InboundUser {
        spec: InboundUserSpec {
            account_type: AccountType::Vless,
            email: email.to_owned(),
            account: serde_json::json!({"id": "9c4478c1-1c4d-41a3-9f12-8f2a0d8f2c11"}),
            ..InboundUserSpec::default()
        },
        ..InboundUser::default()
    }
}

// ── Nodes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn node_create_delete_round_trip() {
    let (_, client) = spawn_server().await;

    let before = now_second();
    let created = client.create_node(&node("n1", 10)).await.unwrap();
    assert!(!created.metadata.uid.is_empty());
    let ts = created.metadata.creation_timestamp.unwrap();
    assert!((ts - before).num_seconds().abs() <= 2);

    let fetched = client.get_node("n1").await.unwrap();
    assert_eq!(fetched, created);

    client.delete_node("n1").await.unwrap();

    let err = client.get_node("n1").await.unwrap_err();
    assert!(err.matches(&Error::node_not_found()));
}

#[tokio::test]
async fn node_upsert_preserves_identity() {
    let (_, client) = spawn_server().await;

    let first = client.create_node(&node("n1", 10)).await.unwrap();
    let second = client.create_node(&node("n1", 20)).await.unwrap();

    assert_eq!(second.metadata.uid, first.metadata.uid);
    assert_eq!(
        second.metadata.creation_timestamp,
        first.metadata.creation_timestamp
    );
    assert_eq!(second.status.capacity.max_inbounds, 20);
}

#[tokio::test]
async fn active_nodes_reflect_status_patches() {
    let (_, client) = spawn_server().await;

    client.create_node(&node("up", 10)).await.unwrap();
    client.create_node(&node("down", 10)).await.unwrap();

    let mut status = client.get_node("down").await.unwrap().status;
    status.ready = false;
    client.update_node_status("down", &status).await.unwrap();

    let active = client.get_active_nodes().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].metadata.name, "up");
}

// ── Inbounds ─────────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_ttl_expires_out_of_listing() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 10)).await.unwrap();

    client
        .create_inbound("n1", &inbound("proxy0", 8, 2))
        .await
        .unwrap();
    assert!(client.get_inbound("n1", "proxy0").await.is_ok());

    tokio::time::sleep(Duration::from_secs(3)).await;

    let err = client.get_inbound("n1", "proxy0").await.unwrap_err();
    assert!(err.matches(&Error::inbound_not_found()));
    assert!(client.get_inbounds("n1").await.unwrap().is_empty());
}

#[tokio::test]
async fn cascade_delete_removes_users() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 10)).await.unwrap();
    client.create_inbound("n1", &inbound("p", 8, 0)).await.unwrap();
    client.create_user("n1", "p", &user("alice@x")).await.unwrap();
    client.create_user("n1", "p", &user("bob@x")).await.unwrap();

    client.delete_inbound("n1", "p").await.unwrap();

    let err = client.get_inbound("n1", "p").await.unwrap_err();
    assert!(err.matches(&Error::inbound_not_found()));
    // Listing users of a deleted inbound must come back empty, not stale.
    let users = client.get_inbound_users("n1", "p").await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn duplicate_inbound_is_conflict() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 10)).await.unwrap();
    client.create_inbound("n1", &inbound("p", 8, 0)).await.unwrap();

    let err = client
        .create_inbound("n1", &inbound("p", 8, 0))
        .await
        .unwrap_err();
    assert!(err.matches(&Error::inbound_conflict()));
}

#[tokio::test]
async fn node_capacity_maps_to_429() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 1)).await.unwrap();
    client.create_inbound("n1", &inbound("p0", 8, 0)).await.unwrap();

    let err = client
        .create_inbound("n1", &inbound("p1", 8, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, satrapy_core::ErrorKind::CapacityExceeded);
    assert_eq!(err.fields.get("status").map(String::as_str), Some("429"));
}

#[tokio::test]
async fn counts_track_creation() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 10)).await.unwrap();
    client.create_inbound("n1", &inbound("p0", 8, 0)).await.unwrap();
    client.create_inbound("n1", &inbound("p1", 8, 0)).await.unwrap();
    client.create_user("n1", "p0", &user("a@x")).await.unwrap();

    assert_eq!(client.count_inbounds("n1").await.unwrap(), 2);
    assert_eq!(client.count_users("n1", "p0").await.unwrap(), 1);
    assert_eq!(client.count_users("n1", "p1").await.unwrap(), 0);
}

#[tokio::test]
async fn inbound_metadata_patch_renews_ttl() {
    let (_, client) = spawn_server().await;
    client.create_node(&node("n1", 10)).await.unwrap();
    client.create_inbound("n1", &inbound("p0", 8, 3)).await.unwrap();

    // Renew just before expiry; the object must outlive its original
    // deadline.
    tokio::time::sleep(Duration::from_secs(2)).await;
    client
        .update_inbound_metadata("n1", "p0", &ObjectMeta::default())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(client.get_inbound("n1", "p0").await.is_ok());
}

// ── Auth ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn requests_without_valid_hmac_are_rejected() {
    let (address, _) = spawn_server().await;
    let http = reqwest::Client::new();
    let url = format!("{address}/api/v1/nodes");

    // Absent header.
    let resp = http.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // Wrong token.
    let header = satrapy_core::auth::build_header("wrong-token");
    let resp = http
        .get(&url)
        .header("Authorization", header)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Stale timestamp, correct token.
    let stale = satrapy_core::auth::build_header_at(
        TOKEN,
        chrono::Utc::now().timestamp() - 120,
    );
    let resp = http
        .get(&url)
        .header("Authorization", stale)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Valid header.
    let valid = satrapy_core::auth::build_header(TOKEN);
    let resp = http
        .get(&url)
        .header("Authorization", valid)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn probes_bypass_auth() {
    let (address, _) = spawn_server().await;
    let http = reqwest::Client::new();

    let livez = http.get(format!("{address}/livez")).send().await.unwrap();
    assert_eq!(livez.status(), 200);

    let readyz = http.get(format!("{address}/readyz")).send().await.unwrap();
    assert_eq!(readyz.status(), 200);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (address, _) = spawn_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{address}/api/v1/nodes"))
        .header("Authorization", satrapy_core::auth::build_header(TOKEN))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
