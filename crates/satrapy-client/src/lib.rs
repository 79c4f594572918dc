//! Typed HTTP client for the satrapy control plane.
//!
//! Used by node agents, the cluster controller, and test tooling. Every
//! request carries `Content-Type: application/json` and a fresh HMAC
//! `Authorization` header; responses are mapped onto the domain error
//! taxonomy with the kind-specific flavour of the endpoint family.

mod inbound;
mod node;

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use satrapy_core::{auth, Error};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which resource family an endpoint belongs to; selects the sentinel
/// used for 404/409/429 responses.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Flavor {
    Node,
    Inbound,
    User,
}

/// A control-plane client bound to one apiserver address and token.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    address: String,
    token: String,
}

impl Client {
    /// Build a client for `address` (e.g. `http://127.0.0.1:6440`) with
    /// the given shared token and per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(address: &str, token: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal("http client build failed", e))?;

        Ok(Self {
            http,
            address: address.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    /// The apiserver address this client talks to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        flavor: Flavor,
    ) -> Result<Response, Error> {
        let url = format!("{}{path}", self.address);
        let mut request = self
            .http
            .request(method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, auth::build_header(&self.token));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::internal("request failed", e).with_field("url", &url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body, flavor).with_field("url", &url))
    }

    pub(crate) async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        flavor: Flavor,
    ) -> Result<T, Error> {
        let response = self.send(method, path, body, flavor).await?;
        response
            .json()
            .await
            .map_err(|e| Error::unmarshal_failed(e).with_field("path", path))
    }
}

fn map_status(status: StatusCode, body: &str, flavor: Flavor) -> Error {
    let err = match (status, flavor) {
        (StatusCode::NOT_FOUND, Flavor::Node) => Error::node_not_found(),
        (StatusCode::NOT_FOUND, Flavor::Inbound) => Error::inbound_not_found(),
        (StatusCode::NOT_FOUND, Flavor::User) => Error::user_not_found(),
        (StatusCode::CONFLICT, Flavor::Inbound) => Error::inbound_conflict(),
        (StatusCode::CONFLICT, Flavor::User) => Error::user_conflict(),
        (StatusCode::TOO_MANY_REQUESTS, Flavor::Node | Flavor::Inbound) => {
            Error::node_capacity_exceeded()
        }
        (StatusCode::TOO_MANY_REQUESTS, Flavor::User) => Error::inbound_capacity_exceeded(),
        _ => Error::new(
            satrapy_core::ErrorKind::Internal,
            satrapy_core::ErrorReason::Unknown,
            "unexpected response",
        ),
    };
    err.with_field("status", status.as_str())
        .with_field("body", body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_takes_the_endpoint_flavour() {
        assert!(map_status(StatusCode::NOT_FOUND, "", Flavor::Node)
            .matches(&Error::node_not_found()));
        assert!(map_status(StatusCode::NOT_FOUND, "", Flavor::Inbound)
            .matches(&Error::inbound_not_found()));
        assert!(map_status(StatusCode::NOT_FOUND, "", Flavor::User)
            .matches(&Error::user_not_found()));
    }

    #[test]
    fn conflict_and_capacity_map_per_family() {
        assert!(map_status(StatusCode::CONFLICT, "", Flavor::Inbound)
            .matches(&Error::inbound_conflict()));
        assert!(map_status(StatusCode::TOO_MANY_REQUESTS, "", Flavor::User)
            .matches(&Error::inbound_capacity_exceeded()));
    }

    #[test]
    fn other_statuses_are_internal_with_context() {
        let err = map_status(StatusCode::BAD_GATEWAY, "upstream died", Flavor::Node);
        assert_eq!(err.kind, satrapy_core::ErrorKind::Internal);
        assert_eq!(err.fields.get("status").map(String::as_str), Some("502"));
        assert_eq!(err.fields.get("body").map(String::as_str), Some("upstream died"));
    }

    #[test]
    fn client_strips_trailing_slash() {
        let client = Client::new("http://127.0.0.1:1/", "t", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.address(), "http://127.0.0.1:1");
    }
}
