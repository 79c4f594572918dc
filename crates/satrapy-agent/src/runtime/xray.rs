//! Xray adapter for the runtime port.
//!
//! Talks to the local Xray gRPC handler service with a lazily connected
//! channel and a per-call timeout. The opaque inbound blob from the
//! control plane is lowered into the handler-service wire form here;
//! users always travel separately via `AlterInbound`, which is what
//! keeps user reconciliation independent of inbound creation.

use std::collections::HashSet;
use std::time::Duration;

use http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use satrapy_core::proxy::{Account, InboundConfig};
use satrapy_core::Error;

use super::proto::{
    self, AddInboundRequest, AddInboundResponse, AddUserOperation, AlterInboundRequest,
    AlterInboundResponse, GetInboundUserRequest, GetInboundUsersResponse, InboundHandlerConfig,
    IpOrDomain, ListInboundsRequest, ListInboundsResponse, PortList, PortRange, ReceiverConfig,
    RemoveInboundRequest, RemoveInboundResponse, RemoveUserOperation, TypedMessage, User,
};
use super::{map_runtime_error, InboundRuntime, RuntimeResource, RESERVED_API_TAG};

const ADD_INBOUND: &str = "/xray.app.proxyman.command.HandlerService/AddInbound";
const REMOVE_INBOUND: &str = "/xray.app.proxyman.command.HandlerService/RemoveInbound";
const LIST_INBOUNDS: &str = "/xray.app.proxyman.command.HandlerService/ListInbounds";
const ALTER_INBOUND: &str = "/xray.app.proxyman.command.HandlerService/AlterInbound";
const GET_INBOUND_USERS: &str = "/xray.app.proxyman.command.HandlerService/GetInboundUsers";

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// [`InboundRuntime`] over the Xray gRPC API.
#[derive(Clone)]
pub struct XrayRuntime {
    channel: Channel,
    timeout: Duration,
}

impl XrayRuntime {
    /// Build a runtime client for `address:port`. The connection is
    /// established lazily on the first call.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the address does not form a valid URI.
    pub fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let endpoint = Endpoint::from_shared(format!("http://{address}:{port}"))
            .map_err(|e| Error::internal("invalid runtime address", e))?
            .connect_timeout(Duration::from_secs(5));

        Ok(Self {
            channel: endpoint.connect_lazy(),
            timeout,
        })
    }

    async fn unary<Req, Resp>(
        &self,
        path: &'static str,
        message: Req,
        resource: RuntimeResource,
    ) -> Result<Resp, Error>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Error::internal("runtime unavailable", e))?;

        let codec: tonic::codec::ProstCodec<Req, Resp> = tonic::codec::ProstCodec::default();
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.timeout);

        grpc.unary(request, PathAndQuery::from_static(path), codec)
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| map_runtime_error(status.message(), resource))
    }
}

#[async_trait::async_trait]
impl InboundRuntime for XrayRuntime {
    async fn list_inbounds(&self) -> Result<HashSet<String>, Error> {
        let response: ListInboundsResponse = self
            .unary(
                LIST_INBOUNDS,
                ListInboundsRequest { is_only_tags: true },
                RuntimeResource::Inbound,
            )
            .await?;

        let mut tags: HashSet<String> = response
            .inbounds
            .into_iter()
            .map(|inbound| inbound.tag)
            .collect();
        tags.remove(RESERVED_API_TAG);
        Ok(tags)
    }

    async fn add_inbound(&self, config: &InboundConfig) -> Result<(), Error> {
        let inbound = build_inbound(config)?;
        self.unary::<_, AddInboundResponse>(
            ADD_INBOUND,
            AddInboundRequest {
                inbound: Some(inbound),
            },
            RuntimeResource::Inbound,
        )
        .await
        .map(|_| ())
    }

    async fn remove_inbound(&self, tag: &str) -> Result<(), Error> {
        self.unary::<_, RemoveInboundResponse>(
            REMOVE_INBOUND,
            RemoveInboundRequest {
                tag: tag.to_owned(),
            },
            RuntimeResource::Inbound,
        )
        .await
        .map(|_| ())
    }

    async fn add_user(&self, tag: &str, email: &str, account: &Account) -> Result<(), Error> {
        let operation = AddUserOperation {
            user: Some(User {
                level: 0,
                email: email.to_owned(),
                account: Some(account_message(account)),
            }),
        };

        self.unary::<_, AlterInboundResponse>(
            ALTER_INBOUND,
            AlterInboundRequest {
                tag: tag.to_owned(),
                operation: Some(TypedMessage::pack(proto::TYPE_ADD_USER_OPERATION, &operation)),
            },
            RuntimeResource::User,
        )
        .await
        .map(|_| ())
    }

    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), Error> {
        let operation = RemoveUserOperation {
            email: email.to_owned(),
        };

        self.unary::<_, AlterInboundResponse>(
            ALTER_INBOUND,
            AlterInboundRequest {
                tag: tag.to_owned(),
                operation: Some(TypedMessage::pack(
                    proto::TYPE_REMOVE_USER_OPERATION,
                    &operation,
                )),
            },
            RuntimeResource::User,
        )
        .await
        .map(|_| ())
    }

    async fn list_users(&self, tag: &str) -> Result<HashSet<String>, Error> {
        let response: GetInboundUsersResponse = self
            .unary(
                GET_INBOUND_USERS,
                GetInboundUserRequest {
                    tag: tag.to_owned(),
                    email: String::new(),
                },
                RuntimeResource::User,
            )
            .await?;

        Ok(response.users.into_iter().map(|user| user.email).collect())
    }
}

/// Lower the opaque inbound blob to the handler-service wire form.
fn build_inbound(config: &InboundConfig) -> Result<InboundHandlerConfig, Error> {
    let port = config.port.ok_or_else(|| {
        Error::invalid_inbound().with_field("tag", &config.tag).with_field("missing", "port")
    })?;

    let receiver = ReceiverConfig {
        port_list: Some(PortList {
            range: vec![PortRange {
                from: u32::from(port),
                to: u32::from(port),
            }],
        }),
        listen: config.listen.as_ref().map(|listen| IpOrDomain {
            address: Some(proto::ip_or_domain::Address::Domain(listen.clone())),
        }),
    };

    let proxy = match config.protocol.as_deref() {
        Some("vless") => TypedMessage::pack(
            proto::TYPE_VLESS_INBOUND,
            &proto::VlessInboundConfig {
                clients: Vec::new(),
                decryption: config
                    .settings
                    .as_ref()
                    .and_then(|s| s.get("decryption"))
                    .and_then(|d| d.as_str())
                    .unwrap_or("none")
                    .to_owned(),
            },
        ),
        Some("vmess") => TypedMessage::pack(
            proto::TYPE_VMESS_INBOUND,
            &proto::VmessInboundConfig { user: Vec::new() },
        ),
        Some("trojan") => TypedMessage::pack(
            proto::TYPE_TROJAN_SERVER,
            &proto::TrojanServerConfig { users: Vec::new() },
        ),
        other => {
            return Err(Error::invalid_inbound()
                .with_field("tag", &config.tag)
                .with_field("protocol", other.unwrap_or("")));
        }
    };

    Ok(InboundHandlerConfig {
        tag: config.tag.clone(),
        receiver_settings: Some(TypedMessage::pack(proto::TYPE_RECEIVER_CONFIG, &receiver)),
        proxy_settings: Some(proxy),
    })
}

/// Pack a typed credential into its wire account message.
fn account_message(account: &Account) -> TypedMessage {
    match account {
        Account::Vless(a) => TypedMessage::pack(
            proto::TYPE_VLESS_ACCOUNT,
            &proto::VlessAccount {
                id: a.id.clone(),
                flow: a.flow.clone(),
                encryption: String::new(),
            },
        ),
        Account::Vmess(a) => TypedMessage::pack(
            proto::TYPE_VMESS_ACCOUNT,
            &proto::VmessAccount {
                id: a.id.clone(),
                alter_id: 0,
            },
        ),
        Account::Trojan(a) => TypedMessage::pack(
            proto::TYPE_TROJAN_ACCOUNT,
            &proto::TrojanAccount {
                password: a.password.clone(),
            },
        ),
    }
}
