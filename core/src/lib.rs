//! The cluster planner: the four pure stages (evaluate, snapshot, schedule,
//! roll out) that turn a resolved [`cluster_client::ServiceSpec`] into a
//! [`cluster_client::Plan`], plus the outbound adapter contracts a hosting
//! binary implements to execute one.
//!
//! [`deployment::Deployment`] is the one inbound entry point; everything
//! else in this crate is a stage it wires together.

pub mod adapters;
pub mod deployment;
pub mod error;
pub mod evaluate;
pub mod rolling;
pub mod scheduler;
pub mod state;

pub use deployment::{DeployRequest, Deployment};
pub use error::{Error, ExecutionError, Result};
pub use evaluate::{evaluate, Evaluation};
