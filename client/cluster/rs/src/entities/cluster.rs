//! The per-plan cluster snapshot (§3 "ClusterState"). Building one is
//! C3's job (`cluster_core::state::snapshot`); this module only carries
//! the data shape, since it's shared between the client-facing entities
//! and the planner's constraint/scheduler logic.

use crate::entities::machine::{Machine, MachineVolume};

/// A snapshot of the cluster taken at the start of one planning call.
/// Owned exclusively by that call (§5 "Shared resources") — reservations
/// made on it are never written back anywhere.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
  pub machines: Vec<MachineEntry>,
}

impl ClusterState {
  pub fn find(&self, machine_id: &str) -> Option<&MachineEntry> {
    self.machines.iter().find(|m| m.machine.id == machine_id)
  }

  pub fn find_mut(
    &mut self,
    machine_id: &str,
  ) -> Option<&mut MachineEntry> {
    self.machines.iter_mut().find(|m| m.machine.id == machine_id)
  }
}

/// One machine's capacity plus the transient scheduling counters a
/// planning call accumulates against it (§3 "transient scheduling
/// fields").
#[derive(Debug, Clone)]
pub struct MachineEntry {
  pub machine: Machine,
  /// Count of containers already on this machine, for *any* service —
  /// used as the spread-ranker's tie-breaker (§4.4).
  pub existing_containers: usize,
  pub existing_volumes: Vec<MachineVolume>,
  pub scheduled_cpu_nanos: u64,
  pub scheduled_memory_bytes: u64,
  pub scheduled_containers: usize,
  pub scheduled_volumes: Vec<MachineVolume>,
}

impl MachineEntry {
  pub fn new(machine: Machine) -> Self {
    let existing_volumes = machine.volumes.clone();
    MachineEntry {
      machine,
      existing_containers: 0,
      existing_volumes,
      scheduled_cpu_nanos: 0,
      scheduled_memory_bytes: 0,
      scheduled_containers: 0,
      scheduled_volumes: Vec::new(),
    }
  }

  pub fn available_cpu_nanos(&self) -> u64 {
    self
      .machine
      .total_cpu_nanos
      .saturating_sub(self.machine.reserved_cpu_nanos)
      .saturating_sub(self.scheduled_cpu_nanos)
  }

  pub fn available_memory_bytes(&self) -> u64 {
    self
      .machine
      .total_memory_bytes
      .saturating_sub(self.machine.reserved_memory_bytes)
      .saturating_sub(self.scheduled_memory_bytes)
  }

  pub fn has_volume(&self, name: &str) -> Option<&MachineVolume> {
    self
      .existing_volumes
      .iter()
      .chain(self.scheduled_volumes.iter())
      .find(|v| v.name == name)
  }
}
