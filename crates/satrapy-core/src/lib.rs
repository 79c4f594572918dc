//! Core library for satrapy.
//!
//! Contains the declarative resource model (nodes, inbounds, inbound
//! users), the domain error taxonomy, the typed resource stores over the
//! storage port, the domain services that orchestrate them, and the HMAC
//! request-signing contract shared by every HTTP surface. This crate
//! knows nothing about HTTP routing or the proxy runtime.

pub mod auth;
pub mod error;
pub mod meta;
pub mod node;
pub mod proxy;
pub mod resources;
pub mod service;

pub use error::{Error, ErrorKind, ErrorReason};
