//! The domain error taxonomy.
//!
//! Every error crossing a component boundary carries a `kind` (mapped to
//! an HTTP status by the API layer), a `reason` (machine-readable cause),
//! a human-readable `message`, and a map of context `fields`, plus an
//! optional wrapped cause that never leaves the process. Sentinel
//! constructors cover the well-known conditions; matching is by kind and
//! reason, never by message text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use satrapy_storage::StorageError;

/// Coarse classification, one HTTP status per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Conflict,
    CapacityExceeded,
    Internal,
}

/// Machine-readable cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorReason {
    MissingParam,
    Unknown,
    MarshalFailed,
    UnmarshalFailed,
    NodeNotFound,
    InboundConflict,
    InboundNotFound,
    UserConflict,
    UserNotFound,
    NodeCapacityExceeded,
    InboundCapacityExceeded,
    ResourceNotFound,
}

/// A domain error.
#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub reason: ErrorReason,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(skip)]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an error from scratch; prefer the sentinel constructors for
    /// the well-known conditions.
    #[must_use]
    pub fn new(kind: ErrorKind, reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason,
            message: message.into(),
            fields: BTreeMap::new(),
            cause: None,
        }
    }

    /// Attach a context field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Attach the wrapped cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// An internal error with an unknown reason.
    #[must_use]
    pub fn internal(
        message: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(ErrorKind::Internal, ErrorReason::Unknown, message).with_cause(cause)
    }

    /// Serialisation into the store failed.
    #[must_use]
    pub fn marshal_failed(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Internal, ErrorReason::MarshalFailed, "marshal failed")
            .with_cause(cause)
    }

    /// Deserialisation out of the store (or a request body) failed.
    #[must_use]
    pub fn unmarshal_failed(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Internal, ErrorReason::UnmarshalFailed, "unmarshal failed")
            .with_cause(cause)
    }

    // ── Sentinels ────────────────────────────────────────────────────

    #[must_use]
    pub fn node_not_found() -> Self {
        Self::new(ErrorKind::NotFound, ErrorReason::NodeNotFound, "node not found")
    }

    #[must_use]
    pub fn inbound_not_found() -> Self {
        Self::new(ErrorKind::NotFound, ErrorReason::InboundNotFound, "inbound not found")
    }

    #[must_use]
    pub fn user_not_found() -> Self {
        Self::new(ErrorKind::NotFound, ErrorReason::UserNotFound, "user not found")
    }

    #[must_use]
    pub fn resource_not_found() -> Self {
        Self::new(ErrorKind::NotFound, ErrorReason::ResourceNotFound, "resource not found")
    }

    #[must_use]
    pub fn inbound_conflict() -> Self {
        Self::new(ErrorKind::Conflict, ErrorReason::InboundConflict, "inbound already exists")
    }

    #[must_use]
    pub fn user_conflict() -> Self {
        Self::new(ErrorKind::Conflict, ErrorReason::UserConflict, "user already exists")
    }

    #[must_use]
    pub fn node_capacity_exceeded() -> Self {
        Self::new(
            ErrorKind::CapacityExceeded,
            ErrorReason::NodeCapacityExceeded,
            "node capacity exceeded",
        )
    }

    #[must_use]
    pub fn inbound_capacity_exceeded() -> Self {
        Self::new(
            ErrorKind::CapacityExceeded,
            ErrorReason::InboundCapacityExceeded,
            "inbound capacity exceeded",
        )
    }

    #[must_use]
    pub fn invalid_node() -> Self {
        Self::new(ErrorKind::Invalid, ErrorReason::MissingParam, "nodeName cannot be empty")
    }

    #[must_use]
    pub fn invalid_inbound() -> Self {
        Self::new(ErrorKind::Invalid, ErrorReason::MissingParam, "tag cannot be empty")
    }

    #[must_use]
    pub fn invalid_user() -> Self {
        Self::new(ErrorKind::Invalid, ErrorReason::MissingParam, "email cannot be empty")
    }

    // ── Matching ─────────────────────────────────────────────────────

    /// Sentinel equality: same kind and reason.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.kind == other.kind && self.reason == other.reason
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {cause}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Map a raw storage failure into the taxonomy, substituting the
/// kind-specific sentinel for the store's opaque not-found.
pub(crate) fn from_storage(err: StorageError, not_found: fn() -> Error) -> Error {
    if err.is_not_found() {
        not_found()
    } else {
        Error::internal("storage operation failed", err)
    }
}
