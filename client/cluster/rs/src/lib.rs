//! Entities and pure, stateless spec transforms shared between a deployment
//! planner and whatever RPC/CLI layer a caller puts in front of it.
//!
//! This crate owns "what gets sent over the wire": the declarative
//! [`entities::spec::ServiceSpec`] a client submits, the observed
//! [`entities::service::Service`]/[`entities::service::Container`] state a
//! machine reports back, and the [`entities::plan::Plan`] a planner emits.
//! It also owns [`resolve::ServiceSpecResolver`], since resolving a spec's
//! defaults doesn't need cluster state — only the spec itself plus a
//! couple of cluster-wide knobs the caller already has in hand.

pub mod entities;
pub mod resolve;
pub mod validate;

pub use entities::*;
