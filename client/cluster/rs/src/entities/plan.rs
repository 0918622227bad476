//! The output of C5 (§3 "Plan").

use crate::entities::service::Container;
use crate::entities::spec::{ContainerSpec, PortSpec, UpdateOrder, VolumeSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
  pub service_id: String,
  pub service_name: String,
  pub operations: Vec<Operation>,
}

impl Plan {
  pub fn new(service_id: impl Into<String>, service_name: impl Into<String>) -> Self {
    Plan {
      service_id: service_id.into(),
      service_name: service_name.into(),
      operations: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }

  pub fn push(&mut self, op: Operation) {
    self.operations.push(op);
  }
}

/// One atomic action for the external operation runner to perform
/// (§3 "Plan", §4.5.4). Planning never mutates the cluster; it only
/// produces these.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
  Run {
    machine_id: String,
    spec: ContainerSpec,
    ports: Vec<PortSpec>,
  },
  Stop {
    machine_id: String,
    container_id: String,
  },
  /// Stops then removes, including the container's anonymous volumes
  /// (§3 "Remove").
  Remove {
    machine_id: String,
    container: Container,
  },
  /// Encapsulates a Run + Remove pair with the chosen ordering (§4.5.3).
  Replace {
    machine_id: String,
    old_container: Container,
    spec: ContainerSpec,
    ports: Vec<PortSpec>,
    order: UpdateOrder,
  },
  /// Relabel without restart; only ever emitted when the evaluator said
  /// `NeedsUpdate` (§4.1).
  UpdateSpec {
    machine_id: String,
    container_id: String,
    new_spec: ContainerSpec,
  },
  CreateVolume {
    machine_id: String,
    volume: VolumeSpec,
  },
}

impl Operation {
  /// Short tag for logging/error context (§7 "operation kind").
  pub fn kind(&self) -> &'static str {
    match self {
      Operation::Run { .. } => "run",
      Operation::Stop { .. } => "stop",
      Operation::Remove { .. } => "remove",
      Operation::Replace { .. } => "replace",
      Operation::UpdateSpec { .. } => "update_spec",
      Operation::CreateVolume { .. } => "create_volume",
    }
  }

  pub fn machine_id(&self) -> &str {
    match self {
      Operation::Run { machine_id, .. }
      | Operation::Stop { machine_id, .. }
      | Operation::Remove { machine_id, .. }
      | Operation::Replace { machine_id, .. }
      | Operation::UpdateSpec { machine_id, .. }
      | Operation::CreateVolume { machine_id, .. } => machine_id,
    }
  }
}
