//! C3: cluster snapshot and the constraint model it's evaluated against
//! (§4.3).
//!
//! Grounded on `bin/core/src/resource/server.rs`'s "build a view of one
//! resource, check it against a few independent predicates" shape; the
//! predicates here are `Constraint`s instead of health checks.

use cluster_client::{
  ClusterState, ContainerSpec, Machine, MachineEntry, MachineLiveness,
  Placement, VolumeMount,
};

/// `snapshot(cluster)` (§4.3): list machines including `SUSPECT`,
/// excluding `DOWN`. `machines` is the raw fleet roster; counting each
/// machine's existing containers is the caller's job since that requires
/// a service listing this module doesn't own.
pub fn snapshot(
  machines: impl IntoIterator<Item = Machine>,
  existing_container_counts: impl Fn(&str) -> usize,
) -> ClusterState {
  let entries = machines
    .into_iter()
    .filter(|m| m.state != MachineLiveness::Down)
    .map(|m| {
      let mut entry = MachineEntry::new(m);
      entry.existing_containers = existing_container_counts(&entry.machine.id);
      entry
    })
    .collect();
  ClusterState { machines: entries }
}

#[derive(Debug, Clone)]
pub enum Constraint {
  /// Machine name or ID must be in the allow-list.
  Placement(Placement),
  Resource { cpu_nanos: u64, memory_bytes: u64 },
  /// Every mount targeting a named volume must resolve on the machine.
  Volume(Vec<VolumeMount>),
}

pub struct ConstraintReport {
  pub satisfied: bool,
  pub reason: Option<String>,
}

impl Constraint {
  pub fn evaluate(&self, entry: &MachineEntry) -> ConstraintReport {
    match self {
      Constraint::Placement(placement) => {
        if placement.machines.is_empty()
          || placement
            .machines
            .iter()
            .any(|needle| entry.machine.matches(needle))
        {
          ConstraintReport { satisfied: true, reason: None }
        } else {
          ConstraintReport {
            satisfied: false,
            reason: Some(format!(
              "machine {:?} is not in the placement allow-list {:?}",
              entry.machine.name, placement.machines
            )),
          }
        }
      }
      Constraint::Resource { cpu_nanos, memory_bytes } => {
        let cpu_ok = *cpu_nanos <= entry.available_cpu_nanos();
        let mem_ok = *memory_bytes <= entry.available_memory_bytes();
        if cpu_ok && mem_ok {
          ConstraintReport { satisfied: true, reason: None }
        } else {
          ConstraintReport {
            satisfied: false,
            reason: Some(format!(
              "machine {:?} has {} CPU nanos / {} memory bytes available, needs {}/{}",
              entry.machine.name,
              entry.available_cpu_nanos(),
              entry.available_memory_bytes(),
              cpu_nanos,
              memory_bytes
            )),
          }
        }
      }
      Constraint::Volume(mounts) => {
        for mount in mounts {
          match entry.has_volume(&mount.volume_name) {
            Some(_) => continue,
            None => {
              return ConstraintReport {
                satisfied: false,
                reason: Some(format!(
                  "machine {:?} has no volume named {:?}",
                  entry.machine.name, mount.volume_name
                )),
              };
            }
          }
        }
        ConstraintReport { satisfied: true, reason: None }
      }
    }
  }
}

/// `constraintsFromSpec` (§4.3): placement added iff the allow-list is
/// non-empty, volumes added iff any mount targets a named volume,
/// resources added iff any reservation is set.
pub fn constraints_from_spec(
  placement: &Placement,
  container: &ContainerSpec,
) -> Vec<Constraint> {
  let mut constraints = Vec::new();

  if !placement.machines.is_empty() {
    constraints.push(Constraint::Placement(placement.clone()));
  }

  let named_volume_mounts: Vec<VolumeMount> = container
    .volume_mounts
    .iter()
    .filter(|m| !m.volume_name.is_empty())
    .cloned()
    .collect();
  if !named_volume_mounts.is_empty() {
    constraints.push(Constraint::Volume(named_volume_mounts));
  }

  let r = &container.resources;
  if r.cpu_reservation_nanos > 0 || r.memory_reservation_bytes > 0 {
    constraints.push(Constraint::Resource {
      cpu_nanos: r.cpu_reservation_nanos,
      memory_bytes: r.memory_reservation_bytes,
    });
  }

  constraints
}

/// Renders the per-machine failure report `EligibleMachines` returns when
/// no machine satisfies every constraint (§4.4).
pub fn unsatisfied_report(
  machines: &[MachineEntry],
  constraints: &[Constraint],
) -> String {
  let mut lines = Vec::new();
  for entry in machines {
    let failures: Vec<String> = constraints
      .iter()
      .filter_map(|c| {
        let report = c.evaluate(entry);
        if report.satisfied {
          None
        } else {
          report.reason
        }
      })
      .collect();
    if !failures.is_empty() {
      lines.push(format!("- {}: {}", entry.machine.name, failures.join("; ")));
    }
  }
  lines.join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::{ContainerSpec, PullPolicy, Resources, VolumeMount};
  use indexmap::IndexMap;

  fn machine(id: &str, state: MachineLiveness) -> Machine {
    Machine {
      id: id.to_string(),
      name: id.to_string(),
      total_cpu_nanos: 4_000_000_000,
      total_memory_bytes: 8_000_000_000,
      reserved_cpu_nanos: 0,
      reserved_memory_bytes: 0,
      public_ip: None,
      management_ip: "10.0.0.1".to_string(),
      state,
      volumes: vec![],
    }
  }

  #[test]
  fn snapshot_excludes_down_machines() {
    let machines = vec![
      machine("m1", MachineLiveness::Up),
      machine("m2", MachineLiveness::Suspect),
      machine("m3", MachineLiveness::Down),
    ];
    let state = snapshot(machines, |_| 0);
    assert_eq!(state.machines.len(), 2);
    assert!(state.find("m3").is_none());
  }

  #[test]
  fn resource_constraint_rejects_when_insufficient() {
    let entry = MachineEntry::new(machine("m1", MachineLiveness::Up));
    let constraint =
      Constraint::Resource { cpu_nanos: 8_000_000_000, memory_bytes: 0 };
    assert!(!constraint.evaluate(&entry).satisfied);
  }

  #[test]
  fn constraints_from_spec_skips_empty_placement() {
    let container = ContainerSpec {
      image: "nginx".to_string(),
      command: vec![],
      entrypoint: vec![],
      env: IndexMap::new(),
      user: None,
      labels: IndexMap::new(),
      privileged: false,
      sysctls: IndexMap::new(),
      pull_policy: PullPolicy::Missing,
      cap_add: vec![],
      cap_drop: vec![],
      resources: Resources::default(),
      volume_mounts: vec![VolumeMount {
        volume_name: "data".to_string(),
        container_path: "/data".to_string(),
        read_only: false,
      }],
      log_driver: Default::default(),
      health_check: None,
    };
    let constraints =
      constraints_from_spec(&Placement::default(), &container);
    assert_eq!(constraints.len(), 1);
    assert!(matches!(constraints[0], Constraint::Volume(_)));
  }
}
