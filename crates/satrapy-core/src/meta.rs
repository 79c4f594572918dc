//! Common object metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Well-known label keys stamped by the node agent at registration.
pub const LABEL_HOSTNAME: &str = "hostname";
pub const LABEL_OS: &str = "os";
pub const LABEL_ARCH: &str = "arch";
pub const LABEL_COUNTRY: &str = "country";
pub const LABEL_REGION: &str = "region";
pub const LABEL_PROVIDER: &str = "provider";

/// Metadata carried by every persisted object.
///
/// `name` is the primary key within its kind. `uid` and
/// `creation_timestamp` are assigned by the server on first create and
/// never change for the lifetime of the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Assign a fresh server-side identity: a random UID and the current
    /// wall-clock time at second resolution.
    pub fn assign_identity(&mut self) {
        self.uid = uuid::Uuid::new_v4().to_string();
        self.creation_timestamp = Some(now_second());
    }

    /// Copy the immutable identity fields from an existing object,
    /// keeping everything else.
    pub fn preserve_identity(&mut self, existing: &ObjectMeta) {
        self.name.clone_from(&existing.name);
        self.uid.clone_from(&existing.uid);
        self.creation_timestamp = existing.creation_timestamp;
    }
}

/// Current wall-clock time truncated to whole seconds, the resolution
/// every persisted timestamp uses.
#[must_use]
pub fn now_second() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
