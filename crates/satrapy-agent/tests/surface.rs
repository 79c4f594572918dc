//! Tests for the agent's HTTP surface.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

use satrapy_agent::server::{self, AgentState};
use satrapy_agent::runtime::InboundRuntime;
use satrapy_core::auth;
use satrapy_core::proxy::{Account, InboundConfig};
use satrapy_core::Error;

const NODE_TOKEN: &str = "node-secret";

/// Just enough runtime to serve the surface handlers.
#[derive(Default)]
struct StubRuntime {
    inbounds: Mutex<HashMap<String, HashSet<String>>>,
}

#[async_trait::async_trait]
impl InboundRuntime for StubRuntime {
    async fn list_inbounds(&self) -> Result<HashSet<String>, Error> {
        Ok(self.inbounds.lock().unwrap().keys().cloned().collect())
    }

    async fn add_inbound(&self, config: &InboundConfig) -> Result<(), Error> {
        let mut inbounds = self.inbounds.lock().unwrap();
        if inbounds.contains_key(&config.tag) {
            return Err(Error::inbound_conflict());
        }
        inbounds.insert(config.tag.clone(), HashSet::new());
        Ok(())
    }

    async fn remove_inbound(&self, tag: &str) -> Result<(), Error> {
        if self.inbounds.lock().unwrap().remove(tag).is_none() {
            return Err(Error::inbound_not_found());
        }
        Ok(())
    }

    async fn add_user(&self, tag: &str, email: &str, _account: &Account) -> Result<(), Error> {
        let mut inbounds = self.inbounds.lock().unwrap();
        let users = inbounds.get_mut(tag).ok_or_else(Error::user_not_found)?;
        if !users.insert(email.to_owned()) {
            return Err(Error::user_conflict());
        }
        Ok(())
    }

    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), Error> {
        let mut inbounds = self.inbounds.lock().unwrap();
        let users = inbounds.get_mut(tag).ok_or_else(Error::user_not_found)?;
        if !users.remove(email) {
            return Err(Error::user_not_found());
        }
        Ok(())
    }

    async fn list_users(&self, tag: &str) -> Result<HashSet<String>, Error> {
        self.inbounds
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
            .ok_or_else(Error::user_not_found)
    }
}

async fn spawn_surface() -> String {
    let state = Arc::new(AgentState {
        runtime: Arc::new(StubRuntime::default()),
        token: NODE_TOKEN.to_owned(),
    });
    let app = server::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn authed(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("Authorization", auth::build_header(NODE_TOKEN))
}

#[tokio::test]
async fn inbound_lifecycle_over_the_surface() {
    let base = spawn_surface().await;
    let http = reqwest::Client::new();

    let config = serde_json::json!({
        "tag": "adhoc0",
        "port": 8443,
        "protocol": "vless",
    });

    let resp = authed(http.post(format!("{base}/api/v1/inbounds")))
        .json(&config)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Same tag again conflicts.
    let resp = authed(http.post(format!("{base}/api/v1/inbounds")))
        .json(&config)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = authed(http.get(format!("{base}/api/v1/inbounds/count")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let count: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(count["count"], 1);

    let resp = authed(http.delete(format!("{base}/api/v1/inbounds/adhoc0")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // Second delete finds nothing.
    let resp = authed(http.delete(format!("{base}/api/v1/inbounds/adhoc0")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn user_lifecycle_over_the_surface() {
    let base = spawn_surface().await;
    let http = reqwest::Client::new();

    let config = serde_json::json!({"tag": "adhoc0", "port": 8443, "protocol": "trojan"});
    authed(http.post(format!("{base}/api/v1/inbounds")))
        .json(&config)
        .send()
        .await
        .unwrap();

    let user = serde_json::json!({
        "spec": {
            "type": "trojan",
            "inboundTag": "adhoc0",
            "email": "carol@x",
            "account": {"password": "pw"},
        }
    });

    let resp = authed(http.post(format!("{base}/api/v1/inbounds/adhoc0/users")))
        .json(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = authed(http.delete(format!(
        "{base}/api/v1/inbounds/adhoc0/users/carol@x"
    )))
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn bad_account_blob_is_rejected_as_bad_request() {
    let base = spawn_surface().await;
    let http = reqwest::Client::new();

    authed(http.post(format!("{base}/api/v1/inbounds")))
        .json(&serde_json::json!({"tag": "adhoc0", "port": 1, "protocol": "vless"}))
        .send()
        .await
        .unwrap();

    // Declares vmess but carries a trojan-shaped blob.
    let user = serde_json::json!({
        "spec": {
            "type": "vmess",
            "inboundTag": "adhoc0",
            "email": "d@x",
            "account": {"password": "pw"},
        }
    });
    let resp = authed(http.post(format!("{base}/api/v1/inbounds/adhoc0/users")))
        .json(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn surface_requires_the_node_token() {
    let base = spawn_surface().await;
    let http = reqwest::Client::new();

    let resp = http
        .get(format!("{base}/api/v1/inbounds/count"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = http
        .get(format!("{base}/api/v1/inbounds/count"))
        .header("Authorization", auth::build_header("wrong-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = http.get(format!("{base}/livez")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}
