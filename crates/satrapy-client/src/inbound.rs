//! Inbound and inbound-user endpoints.

use reqwest::Method;

use satrapy_core::meta::ObjectMeta;
use satrapy_core::proxy::{Count, Inbound, InboundSpec, InboundUser, InboundUserSpec};
use satrapy_core::Error;

use crate::{Client, Flavor};

impl Client {
    // ── Inbounds ─────────────────────────────────────────────────────

    pub async fn get_inbounds(&self, node: &str) -> Result<Vec<Inbound>, Error> {
        if node.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send_json::<(), _>(
            Method::GET,
            &format!("/api/v1/nodes/{node}/inbounds"),
            None,
            Flavor::Inbound,
        )
        .await
    }

    pub async fn get_inbound(&self, node: &str, tag: &str) -> Result<Inbound, Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        self.send_json::<(), _>(
            Method::GET,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}"),
            None,
            Flavor::Inbound,
        )
        .await
    }

    pub async fn create_inbound(&self, node: &str, inbound: &Inbound) -> Result<Inbound, Error> {
        if node.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send_json(
            Method::POST,
            &format!("/api/v1/nodes/{node}/inbounds"),
            Some(inbound),
            Flavor::Inbound,
        )
        .await
    }

    pub async fn delete_inbound(&self, node: &str, tag: &str) -> Result<(), Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        self.send::<()>(
            Method::DELETE,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}"),
            None,
            Flavor::Inbound,
        )
        .await
        .map(|_| ())
    }

    pub async fn count_inbounds(&self, node: &str) -> Result<u32, Error> {
        let count: Count = self
            .send_json::<(), _>(
                Method::GET,
                &format!("/api/v1/nodes/{node}/inbounds/count"),
                None,
                Flavor::Inbound,
            )
            .await?;
        Ok(count.count)
    }

    pub async fn update_inbound_metadata(
        &self,
        node: &str,
        tag: &str,
        metadata: &ObjectMeta,
    ) -> Result<(), Error> {
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/metadata"),
            Some(metadata),
            Flavor::Inbound,
        )
        .await
        .map(|_| ())
    }

    pub async fn update_inbound_spec(
        &self,
        node: &str,
        tag: &str,
        spec: &InboundSpec,
    ) -> Result<(), Error> {
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/spec"),
            Some(spec),
            Flavor::Inbound,
        )
        .await
        .map(|_| ())
    }

    // ── Users ────────────────────────────────────────────────────────

    pub async fn get_inbound_users(&self, node: &str, tag: &str) -> Result<Vec<InboundUser>, Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        self.send_json::<(), _>(
            Method::GET,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users"),
            None,
            Flavor::User,
        )
        .await
    }

    pub async fn get_user(&self, node: &str, tag: &str, email: &str) -> Result<InboundUser, Error> {
        if email.is_empty() {
            return Err(Error::invalid_user());
        }
        self.send_json::<(), _>(
            Method::GET,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users/{email}"),
            None,
            Flavor::User,
        )
        .await
    }

    pub async fn create_user(
        &self,
        node: &str,
        tag: &str,
        user: &InboundUser,
    ) -> Result<InboundUser, Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        self.send_json(
            Method::POST,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users"),
            Some(user),
            Flavor::User,
        )
        .await
    }

    pub async fn delete_user(&self, node: &str, tag: &str, email: &str) -> Result<(), Error> {
        if email.is_empty() {
            return Err(Error::invalid_user());
        }
        self.send::<()>(
            Method::DELETE,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users/{email}"),
            None,
            Flavor::User,
        )
        .await
        .map(|_| ())
    }

    pub async fn count_users(&self, node: &str, tag: &str) -> Result<u32, Error> {
        let count: Count = self
            .send_json::<(), _>(
                Method::GET,
                &format!("/api/v1/nodes/{node}/inbounds/{tag}/users/count"),
                None,
                Flavor::User,
            )
            .await?;
        Ok(count.count)
    }

    pub async fn update_user_metadata(
        &self,
        node: &str,
        tag: &str,
        email: &str,
        metadata: &ObjectMeta,
    ) -> Result<(), Error> {
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users/{email}/metadata"),
            Some(metadata),
            Flavor::User,
        )
        .await
        .map(|_| ())
    }

    pub async fn update_user_spec(
        &self,
        node: &str,
        tag: &str,
        email: &str,
        spec: &InboundUserSpec,
    ) -> Result<(), Error> {
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{node}/inbounds/{tag}/users/{email}/spec"),
            Some(spec),
            Flavor::User,
        )
        .await
        .map(|_| ())
    }
}
