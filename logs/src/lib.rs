//! C6: combines per-container log streams from many machines into one
//! globally time-ordered stream (§4.6). Its own crate since it has its
//! own concurrency model, independent of the deployment planner in
//! `cluster_core`, and is usable standalone — e.g. embedded in a CLI that
//! only tails logs.

pub mod error;
pub mod merger;

pub use error::MergeError;
pub use merger::{LogMerger, LogSource, MergeOptions};
