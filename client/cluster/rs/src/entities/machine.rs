//! A cluster member machine (§3 "Machine").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
  pub id: String,
  pub name: String,
  pub total_cpu_nanos: u64,
  pub total_memory_bytes: u64,
  /// Already committed by other services on this machine; a hard bound,
  /// unlike limits (§4.3 "Resource").
  pub reserved_cpu_nanos: u64,
  pub reserved_memory_bytes: u64,
  pub public_ip: Option<String>,
  pub management_ip: String,
  pub state: MachineLiveness,
  pub volumes: Vec<MachineVolume>,
}

impl Machine {
  /// True if either the machine's own name or ID matches `needle`, used
  /// by the placement constraint (§4.3) and by port-resolver hostname
  /// lookups.
  pub fn matches(&self, needle: &str) -> bool {
    self.id == needle || self.name == needle
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MachineLiveness {
  Up,
  Suspect,
  Down,
}

/// A volume already present on a machine, as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineVolume {
  pub name: String,
  pub driver: String,
  #[serde(default)]
  pub driver_opts: IndexMap<String, String>,
}
