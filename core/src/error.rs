//! Boundary error taxonomy. Callers pattern-match on this instead of
//! string-sniffing an `anyhow::Error`; adapter/plumbing failures elsewhere
//! in this crate stay `anyhow::Result` with `.context(...)`.

use cluster_client::resolve::ResolveError;
use cluster_client::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("invalid spec: {0}")]
  Validation(#[from] ValidationError),

  #[error("invalid spec: {0}")]
  Resolve(#[from] ResolveError),

  #[error("no eligible machine for this deployment:\n{report}")]
  ResourceExhausted { report: String },

  #[error("{message}")]
  StateMismatch { message: String },

  #[error("{kind} {id:?} not found")]
  NotFound { kind: &'static str, id: String },

  #[error(
    "service {name:?} already exists in namespace {existing_namespace:?}, refusing to deploy into {requested_namespace:?}"
  )]
  NamespaceMismatch {
    name: String,
    existing_namespace: String,
    requested_namespace: String,
  },

  #[error("no machine satisfies this service's constraints:\n{report}")]
  NoMatchingMachines { report: String },

  #[error("no machine in the cluster is reachable (UP or SUSPECT)")]
  NoReachableMachines,

  /// Surfaced by a caller wrapping `cluster_logs::LogMerger`'s synthetic
  /// stall entries into this taxonomy, not raised by this crate directly.
  #[error("log stream for container {container_id:?} stalled")]
  LogStreamStalled { container_id: String },

  #[error("internal error: {0}")]
  Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wraps the `Operation` that failed plus the adapter error that caused it
/// (§7 "Execution errors abort the plan at the failing operation"). Built
/// by the operation runner a hosting binary provides; this crate doesn't
/// execute plans itself, but the type lives here so plan-emitting and
/// plan-executing code share one error shape.
#[derive(Debug, thiserror::Error)]
#[error("{operation_kind} on machine {machine_id:?} failed: {source:#}")]
pub struct ExecutionError {
  pub operation_kind: &'static str,
  pub machine_id: String,
  #[source]
  pub source: anyhow::Error,
}
