//! Observed state: what a machine reports back about a deployed service
//! (§3 "Service", "Container").

use serde::{Deserialize, Serialize};

use crate::entities::spec::{EffectiveSpec, PortSpec, ServiceMode};

/// A deployed service as tracked across the cluster. `id` is opaque and
/// generated on first deploy (§3 "Lifecycle").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
  pub id: String,
  pub name: String,
  pub namespace: String,
  pub mode: ServiceMode,
  pub containers: Vec<ServiceContainer>,
}

impl Service {
  pub fn running_containers(&self) -> impl Iterator<Item = &Container> {
    self
      .containers
      .iter()
      .map(|sc| &sc.container)
      .filter(|c| c.state.is_running())
  }

  pub fn containers_on(
    &self,
    machine_id: &str,
  ) -> impl Iterator<Item = &Container> {
    self
      .containers
      .iter()
      .filter(move |sc| sc.machine_id == machine_id)
      .map(|sc| &sc.container)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContainer {
  pub machine_id: String,
  pub container: Container,
}

/// Labels a container carries identifying the service it belongs to
/// (§6 "Service-level labels" — the recovery source if store state is
/// lost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLabels {
  pub service_id: String,
  pub service_name: String,
  pub mode: ServiceMode,
}

/// A container as reported by a machine's container daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
  pub id: String,
  pub state: ContainerState,
  /// The spec this container was actually created from — the "effective"
  /// spec against which the evaluator (C1) diffs a new desired spec.
  pub spec: EffectiveSpec,
  pub service_labels: ServiceLabels,
  /// "Port labels": the resolved port list recorded on the container,
  /// independent of `spec.ports` so it survives store loss (§6).
  pub ports: Vec<PortSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
  Starting,
  Healthy,
  Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
  Created,
  Running { health: Option<HealthStatus> },
  Paused,
  Restarting,
  Exited { exit_code: i64 },
  Dead,
}

impl ContainerState {
  /// "Running (non-paused)" as used throughout §4.5 — `Restarting` counts
  /// as running for planning purposes since the container is still the
  /// one occupying the service slot, it just isn't up this instant.
  pub fn is_running(&self) -> bool {
    matches!(
      self,
      ContainerState::Running { .. } | ContainerState::Restarting
    )
  }

  pub fn is_paused(&self) -> bool {
    matches!(self, ContainerState::Paused)
  }
}
