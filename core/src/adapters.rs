//! Outbound adapter contracts (§6). The core calls these; it ships no
//! implementation of them — a hosting binary wires [`crate::Deployment`]
//! to a real `ContainerClient` the way the teacher's `bin/periphery`
//! wires Docker operations to `bollard::Docker`, which is out of scope
//! here.
//!
//! Modeled on the teacher's `periphery_client`/`MachineClient` split: a
//! thin typed request/response boundary, no business logic crossing it.
//! Uses native `async fn` in traits rather than `#[async_trait]` since
//! nothing here needs to be boxed behind `dyn` within this crate.

use cluster_client::{
  Container, LogEntry, Machine, PortSpec, Service, VolumeSpec,
};

#[derive(Debug, Clone)]
pub struct LogFrame {
  pub stream: cluster_client::LogStreamKind,
  pub message: String,
  pub timestamp: cluster_client::Timestamp,
}

pub trait ContainerClient {
  async fn create_container(
    &self,
    spec: &cluster_client::ContainerSpec,
    ports: &[PortSpec],
  ) -> anyhow::Result<Container>;
  async fn start_container(&self, id: &str) -> anyhow::Result<()>;
  async fn stop_container(&self, id: &str) -> anyhow::Result<()>;
  async fn remove_container(&self, id: &str) -> anyhow::Result<()>;
  /// Backs `Operation::UpdateSpec` — relabels a running container without
  /// restarting it.
  async fn update_container_spec(
    &self,
    id: &str,
    new_spec: &cluster_client::ContainerSpec,
  ) -> anyhow::Result<()>;
  async fn exec_container(
    &self,
    id: &str,
    command: &[String],
  ) -> anyhow::Result<String>;
  async fn wait_container_healthy(&self, id: &str) -> anyhow::Result<()>;
  async fn create_volume(&self, spec: &VolumeSpec) -> anyhow::Result<()>;
  async fn list_volumes(&self) -> anyhow::Result<Vec<VolumeSpec>>;
  async fn remove_volume(&self, name: &str) -> anyhow::Result<()>;
  async fn inspect_service_container(
    &self,
    id: &str,
  ) -> anyhow::Result<Container>;
  async fn pull_image(&self, image: &str) -> anyhow::Result<()>;
  /// Returns a stream of raw log frames; EOF is signaled by the stream
  /// ending, not by a sentinel value.
  async fn container_logs(
    &self,
    id: &str,
  ) -> anyhow::Result<tokio::sync::mpsc::Receiver<LogFrame>>;
}

pub trait MachineClient {
  async fn list_machines(
    &self,
    filter: Option<&str>,
  ) -> anyhow::Result<Vec<Machine>>;
  async fn inspect_machine(&self, name_or_id: &str) -> anyhow::Result<Machine>;
  /// Opens connections to `names` and returns a child of `ctx` that tears
  /// them down when cancelled, so a caller fanning a single cancellable
  /// operation out over several machines gets one token back to hold.
  async fn proxy_machines_context(
    &self,
    ctx: tokio_util::sync::CancellationToken,
    names: &[String],
  ) -> anyhow::Result<tokio_util::sync::CancellationToken>;
  async fn check_prerequisites(&self, machine_id: &str) -> anyhow::Result<()>;
}

pub trait ServiceClient {
  async fn inspect_service(
    &self,
    name_or_id: &str,
    namespace: &str,
  ) -> anyhow::Result<Service>;
  async fn list_services(&self, namespace: &str) -> anyhow::Result<Vec<Service>>;
  async fn remove_service(&self, id: &str) -> anyhow::Result<()>;
  async fn start_service(&self, id: &str) -> anyhow::Result<()>;
  async fn stop_service(&self, id: &str) -> anyhow::Result<()>;
}

pub trait DNSClient {
  async fn get_domain(&self) -> anyhow::Result<Option<String>>;
  async fn create_domain_records(
    &self,
    hostnames: &[String],
  ) -> anyhow::Result<()>;
}

/// `LogMerger(streams, opts).Stream()` (§6) lives in `cluster_logs`; this
/// trait only documents the frame type that crosses the boundary between
/// a `ContainerClient`'s raw per-container stream and the merger's input.
pub type LogStream = tokio::sync::mpsc::Receiver<LogEntry>;
