pub mod cluster;
pub mod log;
pub mod machine;
pub mod plan;
pub mod service;
pub mod spec;

pub use cluster::*;
pub use log::*;
pub use machine::*;
pub use plan::*;
pub use service::*;
pub use spec::*;
