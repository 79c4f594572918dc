//! Hand-declared wire messages for the Xray handler service.
//!
//! Only the subset of the proxyman command API the agent actually calls
//! is declared here, with field numbers matching the upstream schema.
//! Payloads that Xray models as `serial.TypedMessage` are built with
//! [`TypedMessage::pack`].

use prost::Message;

/// `xray.common.serial.TypedMessage` — a message name plus its encoded
/// bytes.
#[derive(Clone, PartialEq, Message)]
pub struct TypedMessage {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl TypedMessage {
    /// Encode `message` under its full Xray type name.
    pub fn pack<M: Message>(type_name: &str, message: &M) -> Self {
        Self {
            r#type: type_name.to_owned(),
            value: message.encode_to_vec(),
        }
    }
}

// ── Handler service requests ─────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct AddInboundRequest {
    #[prost(message, optional, tag = "1")]
    pub inbound: Option<InboundHandlerConfig>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveInboundRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct ListInboundsRequest {
    #[prost(bool, tag = "1")]
    pub is_only_tags: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListInboundsResponse {
    #[prost(message, repeated, tag = "1")]
    pub inbounds: Vec<InboundHandlerConfig>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlterInboundRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub operation: Option<TypedMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlterInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct GetInboundUserRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(string, tag = "2")]
    pub email: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetInboundUsersResponse {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<User>,
}

// ── Handler service payloads ─────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct InboundHandlerConfig {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub receiver_settings: Option<TypedMessage>,
    #[prost(message, optional, tag = "3")]
    pub proxy_settings: Option<TypedMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddUserOperation {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveUserOperation {
    #[prost(string, tag = "1")]
    pub email: String,
}

/// `xray.common.protocol.User`.
#[derive(Clone, PartialEq, Message)]
pub struct User {
    #[prost(uint32, tag = "1")]
    pub level: u32,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(message, optional, tag = "3")]
    pub account: Option<TypedMessage>,
}

// ── Receiver settings ────────────────────────────────────────────────

/// `xray.app.proxyman.ReceiverConfig`, reduced to the fields the agent
/// fills in.
#[derive(Clone, PartialEq, Message)]
pub struct ReceiverConfig {
    #[prost(message, optional, tag = "1")]
    pub port_list: Option<PortList>,
    #[prost(message, optional, tag = "2")]
    pub listen: Option<IpOrDomain>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PortList {
    #[prost(message, repeated, tag = "1")]
    pub range: Vec<PortRange>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PortRange {
    #[prost(uint32, tag = "1")]
    pub from: u32,
    #[prost(uint32, tag = "2")]
    pub to: u32,
}

/// `xray.common.net.IPOrDomain`.
#[derive(Clone, PartialEq, Message)]
pub struct IpOrDomain {
    #[prost(oneof = "ip_or_domain::Address", tags = "1, 2")]
    pub address: Option<ip_or_domain::Address>,
}

pub mod ip_or_domain {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Address {
        #[prost(bytes, tag = "1")]
        Ip(Vec<u8>),
        #[prost(string, tag = "2")]
        Domain(String),
    }
}

// ── Protocol accounts ────────────────────────────────────────────────

/// `xray.proxy.vless.Account`.
#[derive(Clone, PartialEq, Message)]
pub struct VlessAccount {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub flow: String,
    #[prost(string, tag = "3")]
    pub encryption: String,
}

/// `xray.proxy.vmess.Account`.
#[derive(Clone, PartialEq, Message)]
pub struct VmessAccount {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub alter_id: u32,
}

/// `xray.proxy.trojan.Account`.
#[derive(Clone, PartialEq, Message)]
pub struct TrojanAccount {
    #[prost(string, tag = "1")]
    pub password: String,
}

// ── Inbound proxy settings ───────────────────────────────────────────

/// `xray.proxy.vless.inbound.Config`; users are attached afterwards via
/// `AlterInbound`.
#[derive(Clone, PartialEq, Message)]
pub struct VlessInboundConfig {
    #[prost(message, repeated, tag = "1")]
    pub clients: Vec<User>,
    #[prost(string, tag = "2")]
    pub decryption: String,
}

/// `xray.proxy.vmess.inbound.Config`.
#[derive(Clone, PartialEq, Message)]
pub struct VmessInboundConfig {
    #[prost(message, repeated, tag = "1")]
    pub user: Vec<User>,
}

/// `xray.proxy.trojan.ServerConfig`.
#[derive(Clone, PartialEq, Message)]
pub struct TrojanServerConfig {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<User>,
}

pub const TYPE_VLESS_ACCOUNT: &str = "xray.proxy.vless.Account";
pub const TYPE_VMESS_ACCOUNT: &str = "xray.proxy.vmess.Account";
pub const TYPE_TROJAN_ACCOUNT: &str = "xray.proxy.trojan.Account";
pub const TYPE_VLESS_INBOUND: &str = "xray.proxy.vless.inbound.Config";
pub const TYPE_VMESS_INBOUND: &str = "xray.proxy.vmess.inbound.Config";
pub const TYPE_TROJAN_SERVER: &str = "xray.proxy.trojan.ServerConfig";
pub const TYPE_RECEIVER_CONFIG: &str = "xray.app.proxyman.ReceiverConfig";
pub const TYPE_ADD_USER_OPERATION: &str = "xray.app.proxyman.command.AddUserOperation";
pub const TYPE_REMOVE_USER_OPERATION: &str = "xray.app.proxyman.command.RemoveUserOperation";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn typed_message_roundtrips() {
        let account = VlessAccount {
            id: "uuid-1".to_owned(),
            flow: String::new(),
            encryption: String::new(),
        };
        let packed = TypedMessage::pack(TYPE_VLESS_ACCOUNT, &account);
        assert_eq!(packed.r#type, TYPE_VLESS_ACCOUNT);

        let back = VlessAccount::decode(packed.value.as_slice()).unwrap();
        assert_eq!(back, account);
    }
}
