//! Global-mode planning (§4.5.2): one container per eligible machine.

use std::collections::HashMap;

use cluster_client::{
  Container, EffectiveSpec, MachineEntry, Operation, Plan, PortSpec,
  ServiceContainer, ServiceSpec,
};

use crate::evaluate::{
  evaluate, has_port_conflict, port_set_differs, Evaluation,
};
use crate::rolling::{ensure_volumes, order::resolve_update_order};
use crate::scheduler::reserve;

/// See `rolling::replicated::classify`: `evaluate` alone can't see ports,
/// so a port-set change forces `NeedsRecreate` even when the rest of the
/// spec is identical.
fn classify(
  container: &Container,
  desired: &EffectiveSpec,
  desired_ports: &[PortSpec],
  force_recreate: bool,
) -> Evaluation {
  if port_set_differs(&container.ports, desired_ports) {
    return Evaluation::NeedsRecreate;
  }
  evaluate(&container.spec, desired, force_recreate)
}

#[allow(clippy::too_many_arguments)]
pub fn plan_global(
  machines: &mut [MachineEntry],
  eligible: &[usize],
  existing: &[ServiceContainer],
  desired: &EffectiveSpec,
  desired_ports: &[PortSpec],
  spec: &ServiceSpec,
  service_id: &str,
  service_name: &str,
  force_recreate: bool,
  cpu_nanos: u64,
  memory_bytes: u64,
) -> Plan {
  let mut plan = Plan::new(service_id, service_name);

  let mut by_machine: HashMap<String, Vec<Container>> = HashMap::new();
  for sc in existing {
    by_machine
      .entry(sc.machine_id.clone())
      .or_default()
      .push(sc.container.clone());
  }

  let eligible_ids: std::collections::HashSet<String> = eligible
    .iter()
    .map(|&position| machines[position].machine.id.clone())
    .collect();

  for &position in eligible {
    let machine_id = machines[position].machine.id.clone();
    let containers = by_machine.get(machine_id.as_str()).cloned().unwrap_or_default();
    let containers: Vec<&Container> = containers.iter().collect();
    reconcile_global_container(
      &mut plan,
      &mut machines[position],
      &machine_id,
      &containers,
      desired,
      desired_ports,
      spec,
      force_recreate,
      cpu_nanos,
      memory_bytes,
    );
  }

  // Any container sitting on a machine outside the eligible set is removed.
  for sc in existing {
    if !eligible_ids.contains(sc.machine_id.as_str()) {
      plan.push(Operation::Remove {
        machine_id: sc.machine_id.clone(),
        container: sc.container.clone(),
      });
    }
  }

  plan
}

#[allow(clippy::too_many_arguments)]
fn reconcile_global_container(
  plan: &mut Plan,
  entry: &mut MachineEntry,
  machine_id: &str,
  containers: &[&Container],
  desired: &EffectiveSpec,
  desired_ports: &[PortSpec],
  spec: &ServiceSpec,
  force_recreate: bool,
  cpu_nanos: u64,
  memory_bytes: u64,
) {
  if containers.is_empty() {
    reserve(entry, cpu_nanos, memory_bytes);
    ensure_volumes(plan, entry, machine_id, &desired.volumes);
    plan.push(Operation::Run {
      machine_id: machine_id.to_string(),
      spec: desired.container.clone(),
      ports: desired_ports.to_vec(),
    });
    return;
  }

  let running: Vec<&Container> =
    containers.iter().copied().filter(|c| c.state.is_running()).collect();

  if let Some(up_to_date) = running.iter().find(|c| {
    classify(c, desired, desired_ports, force_recreate) == Evaluation::UpToDate
  }) {
    for c in containers {
      if c.id != up_to_date.id {
        plan.push(Operation::Remove {
          machine_id: machine_id.to_string(),
          container: (*c).clone(),
        });
      }
    }
    return;
  }

  let needs_recreate = running.iter().any(|c| {
    classify(c, desired, desired_ports, force_recreate)
      == Evaluation::NeedsRecreate
  });

  if !needs_recreate {
    if let Some(to_update) = running.first() {
      plan.push(Operation::UpdateSpec {
        machine_id: machine_id.to_string(),
        container_id: to_update.id.clone(),
        new_spec: desired.container.clone(),
      });
      for c in containers {
        if c.id != to_update.id {
          plan.push(Operation::Remove {
            machine_id: machine_id.to_string(),
            container: (*c).clone(),
          });
        }
      }
      return;
    }
  }

  match running.first() {
    Some(target) => {
      for other in &running {
        if other.id != target.id
          && has_port_conflict(&other.ports, desired_ports)
        {
          plan.push(Operation::Stop {
            machine_id: machine_id.to_string(),
            container_id: other.id.clone(),
          });
        }
      }
      let order = resolve_update_order(
        &spec.update_config,
        &target.ports,
        desired_ports,
        spec.replicas(),
        &desired.volumes,
      );
      ensure_volumes(plan, entry, machine_id, &desired.volumes);
      plan.push(Operation::Replace {
        machine_id: machine_id.to_string(),
        old_container: (*target).clone(),
        spec: desired.container.clone(),
        ports: desired_ports.to_vec(),
        order,
      });
      for c in containers {
        if c.id != target.id {
          plan.push(Operation::Remove {
            machine_id: machine_id.to_string(),
            container: (*c).clone(),
          });
        }
      }
    }
    None => {
      // No running containers at all: bring the service up and clear the
      // stopped remnants.
      reserve(entry, cpu_nanos, memory_bytes);
      ensure_volumes(plan, entry, machine_id, &desired.volumes);
      plan.push(Operation::Run {
        machine_id: machine_id.to_string(),
        spec: desired.container.clone(),
        ports: desired_ports.to_vec(),
      });
      for c in containers {
        plan.push(Operation::Remove {
          machine_id: machine_id.to_string(),
          container: (*c).clone(),
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::{
    ContainerSpec, ContainerState, Machine, MachineLiveness, Placement,
    PullPolicy, Resources, ServiceLabels, ServiceMode, VolumeKind, VolumeSpec,
  };
  use indexmap::IndexMap;

  fn desired_effective(image: &str) -> EffectiveSpec {
    EffectiveSpec {
      namespace: "default".to_string(),
      container: ContainerSpec {
        image: image.to_string(),
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
        volume_mounts: vec![],
        log_driver: Default::default(),
        health_check: None,
      },
      volumes: vec![],
      placement: Placement::default(),
      deploy_labels: IndexMap::new(),
    }
  }

  fn spec() -> ServiceSpec {
    ServiceSpec {
      name: "caddy".to_string(),
      namespace: "default".to_string(),
      mode: ServiceMode::Global,
      container: desired_effective("caddy:2").container,
      replicas: 1,
      volumes: vec![],
      ports: vec![],
      placement: Placement::default(),
      update_config: Default::default(),
      deploy_labels: IndexMap::new(),
    }
  }

  fn machine_entry(id: &str) -> MachineEntry {
    MachineEntry::new(Machine {
      id: id.to_string(),
      name: id.to_string(),
      total_cpu_nanos: 4_000_000_000,
      total_memory_bytes: 8_000_000_000,
      reserved_cpu_nanos: 0,
      reserved_memory_bytes: 0,
      public_ip: None,
      management_ip: "10.0.0.1".to_string(),
      state: MachineLiveness::Up,
      volumes: vec![],
    })
  }

  #[test]
  fn caddy_runs_on_every_machine() {
    let mut machines =
      vec![machine_entry("m1"), machine_entry("m2"), machine_entry("m3")];
    let desired = desired_effective("caddy:2");
    let svc_spec = spec();
    let plan = plan_global(
      &mut machines,
      &[0, 1, 2],
      &[],
      &desired,
      &[],
      &svc_spec,
      "svc1",
      "caddy",
      false,
      0,
      0,
    );
    assert_eq!(plan.operations.len(), 3);
    assert!(plan.operations.iter().all(|op| matches!(op, Operation::Run { .. })));
  }

  #[test]
  fn up_to_date_container_is_left_alone() {
    let mut machines = vec![machine_entry("m1")];
    let desired = desired_effective("caddy:2");
    let svc_spec = spec();
    let container = Container {
      id: "c1".to_string(),
      state: ContainerState::Running { health: None },
      spec: desired.clone(),
      service_labels: ServiceLabels {
        service_id: "svc1".to_string(),
        service_name: "caddy".to_string(),
        mode: ServiceMode::Global,
      },
      ports: vec![],
    };
    let existing =
      vec![ServiceContainer { machine_id: "m1".to_string(), container }];
    let plan = plan_global(
      &mut machines,
      &[0],
      &existing,
      &desired,
      &[],
      &svc_spec,
      "svc1",
      "caddy",
      false,
      0,
      0,
    );
    assert!(plan.is_empty());
  }

  #[test]
  fn machine_outside_eligible_set_gets_removed() {
    let mut machines = vec![machine_entry("m1")];
    let desired = desired_effective("caddy:2");
    let svc_spec = spec();
    let container = Container {
      id: "c1".to_string(),
      state: ContainerState::Running { health: None },
      spec: desired.clone(),
      service_labels: ServiceLabels {
        service_id: "svc1".to_string(),
        service_name: "caddy".to_string(),
        mode: ServiceMode::Global,
      },
      ports: vec![],
    };
    let existing = vec![ServiceContainer {
      machine_id: "m-not-eligible".to_string(),
      container,
    }];
    let plan = plan_global(
      &mut machines,
      &[0],
      &existing,
      &desired,
      &[],
      &svc_spec,
      "svc1",
      "caddy",
      false,
      0,
      0,
    );
    assert_eq!(plan.operations.len(), 2);
    assert!(plan.operations.iter().any(|op| matches!(op, Operation::Run { .. })));
    assert!(plan.operations.iter().any(|op| matches!(op, Operation::Remove { .. })));
  }

  #[test]
  fn fresh_deploy_provisions_a_missing_named_volume() {
    let mut machines = vec![machine_entry("m1")];
    let mut desired = desired_effective("caddy:2");
    desired.volumes.push(VolumeSpec {
      name: "data".to_string(),
      kind: VolumeKind::Named {
        driver: String::new(),
        driver_opts: IndexMap::new(),
      },
    });
    let svc_spec = spec();
    let plan = plan_global(
      &mut machines,
      &[0],
      &[],
      &desired,
      &[],
      &svc_spec,
      "svc1",
      "caddy",
      false,
      0,
      0,
    );
    assert!(plan
      .operations
      .iter()
      .any(|op| matches!(op, Operation::CreateVolume { volume, .. } if volume.name == "data")));
    assert!(machines[0].has_volume("data").is_some());
  }
}
