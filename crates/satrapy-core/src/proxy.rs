//! Proxy resources: inbounds and their users.
//!
//! An inbound is one listening socket configuration on a worker,
//! identified within that worker by its `tag`. An inbound user is a
//! credential authorising a client to use a specific inbound, identified
//! by `email` within `(node, tag)`.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::meta::ObjectMeta;

/// Count responses for `/count` endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub count: u32,
}

/// A listening socket configuration on a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InboundSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSpec {
    #[serde(default)]
    pub capacity: InboundCapacity,
    #[serde(default)]
    pub config: InboundConfig,
    /// Lease length in whole seconds; 0 means permanent.
    #[serde(default, rename = "ttl")]
    pub ttl_secs: u64,
}

/// How many users this inbound accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundCapacity {
    #[serde(default)]
    pub max_users: u32,
}

/// The proxy-runtime inbound blob. Only `tag` is interpreted by the
/// control plane; everything else is carried through to the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundConfig {
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<serde_json::Value>,
}

/// A credential authorising a client on one inbound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundUser {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InboundUserSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundUserSpec {
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub inbound_tag: String,
    #[serde(default)]
    pub email: String,
    /// Raw protocol-specific credential blob; parsed by
    /// [`InboundUser::account`] according to `account_type`.
    #[serde(default)]
    pub account: serde_json::Value,
    /// Lease length in whole seconds; 0 means permanent.
    #[serde(default, rename = "ttl")]
    pub ttl_secs: u64,
}

/// Supported credential protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Vless,
    Vmess,
    Trojan,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlessAccount {
    pub id: String,
    #[serde(default)]
    pub flow: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmessAccount {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrojanAccount {
    pub password: String,
}

/// A typed credential, dispatched from the raw account blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Account {
    Vless(VlessAccount),
    Vmess(VmessAccount),
    Trojan(TrojanAccount),
}

impl InboundUser {
    /// Parse the raw account blob into the typed credential named by
    /// `spec.type`.
    ///
    /// # Errors
    ///
    /// Returns an `Invalid` error when the blob does not match the
    /// declared protocol.
    pub fn account(&self) -> Result<Account, Error> {
        let value = self.spec.account.clone();
        let parsed = match self.spec.account_type {
            AccountType::Vless => serde_json::from_value(value).map(Account::Vless),
            AccountType::Vmess => serde_json::from_value(value).map(Account::Vmess),
            AccountType::Trojan => serde_json::from_value(value).map(Account::Trojan),
        };
        parsed.map_err(|e| {
            Error::unmarshal_failed(e)
                .with_field("email", &self.spec.email)
                .with_field("tag", &self.spec.inbound_tag)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(account_type: AccountType, account: serde_json::Value) -> InboundUser {
        InboundUser {
            spec: InboundUserSpec {
                account_type,
                inbound_tag: "proxy0".to_owned(),
                email: "alice@x".to_owned(),
                account,
                ..InboundUserSpec::default()
            },
            ..InboundUser::default()
        }
    }

    #[test]
    fn vless_account_dispatch() {
        let u = user(
            AccountType::Vless,
            serde_json::json!({"id": "uuid-1", "flow": "xtls-rprx-vision"}),
        );
        assert_eq!(
            u.account().unwrap(),
            Account::Vless(VlessAccount {
                id: "uuid-1".to_owned(),
                flow: "xtls-rprx-vision".to_owned(),
            })
        );
    }

    #[test]
    fn vless_flow_defaults_to_empty() {
        let u = user(AccountType::Vless, serde_json::json!({"id": "uuid-1"}));
        assert_eq!(
            u.account().unwrap(),
            Account::Vless(VlessAccount {
                id: "uuid-1".to_owned(),
                flow: String::new(),
            })
        );
    }

    #[test]
    fn trojan_account_dispatch() {
        let u = user(AccountType::Trojan, serde_json::json!({"password": "s3cret"}));
        assert_eq!(
            u.account().unwrap(),
            Account::Trojan(TrojanAccount {
                password: "s3cret".to_owned(),
            })
        );
    }

    #[test]
    fn mismatched_blob_is_invalid() {
        let u = user(AccountType::Vmess, serde_json::json!({"password": "nope"}));
        let err = u.account().unwrap_err();
        assert_eq!(err.reason, crate::ErrorReason::UnmarshalFailed);
    }

    #[test]
    fn inbound_spec_ttl_serialises_as_ttl() {
        let inbound = Inbound {
            spec: InboundSpec {
                ttl_secs: 30,
                ..InboundSpec::default()
            },
            ..Inbound::default()
        };
        let json = serde_json::to_value(&inbound).unwrap();
        assert_eq!(json["spec"]["ttl"], 30);
    }

    #[test]
    fn marshal_roundtrip_preserves_inbound() {
        let inbound = Inbound {
            metadata: ObjectMeta {
                name: "proxy0".to_owned(),
                ..ObjectMeta::default()
            },
            spec: InboundSpec {
                capacity: InboundCapacity { max_users: 8 },
                config: InboundConfig {
                    tag: "proxy0".to_owned(),
                    port: Some(443),
                    protocol: Some("vless".to_owned()),
                    settings: Some(serde_json::json!({"decryption": "none"})),
                    ..InboundConfig::default()
                },
                ttl_secs: 600,
            },
        };
        let bytes = serde_json::to_vec(&inbound).unwrap();
        let back: Inbound = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, inbound);
    }
}
