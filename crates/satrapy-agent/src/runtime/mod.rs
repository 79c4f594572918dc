//! The proxy-runtime port.
//!
//! Everything the agent needs from the local proxy engine, expressed as
//! one trait so the reconciler can be exercised against a fake. The
//! production implementation is [`XrayRuntime`], an adapter over the
//! Xray-compatible gRPC handler service.
//!
//! Runtime errors are folded onto the domain taxonomy by matching the
//! status message: duplicate targets become `Conflict`, absent targets
//! become `NotFound`, anything else is `Internal`. The reconciler relies
//! on this to treat add-over-existing and remove-of-absent as no-ops.

mod proto;
mod xray;

pub use xray::{XrayRuntime, DEFAULT_CALL_TIMEOUT};

use std::collections::HashSet;

use satrapy_core::proxy::{Account, InboundConfig};
use satrapy_core::{Error, ErrorKind, ErrorReason};

/// The housekeeping inbound every runtime carries for its own gRPC API;
/// never listed, never reconciled.
pub const RESERVED_API_TAG: &str = "api";

/// Operations the agent performs against the local proxy runtime.
#[async_trait::async_trait]
pub trait InboundRuntime: Send + Sync + 'static {
    /// The set of live inbound tags, excluding the reserved `api` tag.
    async fn list_inbounds(&self) -> Result<HashSet<String>, Error>;

    /// Add an inbound. Adding an existing tag returns `Conflict`.
    async fn add_inbound(&self, config: &InboundConfig) -> Result<(), Error>;

    /// Remove an inbound. Removing an absent tag returns `NotFound`.
    async fn remove_inbound(&self, tag: &str) -> Result<(), Error>;

    /// Add a user to an inbound. An existing email returns `Conflict`;
    /// a missing tag returns `NotFound`.
    async fn add_user(&self, tag: &str, email: &str, account: &Account) -> Result<(), Error>;

    /// Remove a user. An absent email returns `NotFound`.
    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), Error>;

    /// The set of user emails on an inbound.
    async fn list_users(&self, tag: &str) -> Result<HashSet<String>, Error>;
}

/// Which resource a runtime call was about; selects the sentinel.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RuntimeResource {
    Inbound,
    User,
}

/// Fold a runtime status message onto the domain taxonomy.
pub(crate) fn map_runtime_error(message: &str, resource: RuntimeResource) -> Error {
    const CONFLICT_MARKERS: [&str; 2] = ["existing tag", "already exists"];
    const NOT_FOUND_MARKERS: [&str; 3] = [
        "not enough information for making a decision",
        "handler not found",
        "not found",
    ];

    if CONFLICT_MARKERS.iter().any(|m| message.contains(m)) {
        return match resource {
            RuntimeResource::Inbound => Error::inbound_conflict(),
            RuntimeResource::User => Error::user_conflict(),
        };
    }

    if NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) {
        return match resource {
            RuntimeResource::Inbound => Error::inbound_not_found(),
            RuntimeResource::User => Error::user_not_found(),
        };
    }

    Error::new(ErrorKind::Internal, ErrorReason::Unknown, "runtime operation failed")
        .with_field("detail", message)
}
