//! Boundary errors for `cluster_logs`. The merger itself never returns a
//! `Result` from its steady-state loop — per-stream failures are reported
//! inline as synthetic error entries (§4.6 "Error forwarding") — this is
//! only for construction-time misuse.

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
  #[error("log merger needs at least one input stream")]
  NoStreams,
}
