//! Replicated-mode planning (§4.5.1).

use std::collections::HashSet;

use cluster_client::{
  Container, EffectiveSpec, MachineEntry, Operation, Plan, PortSpec,
  ServiceContainer, ServiceSpec, UpdateOrder,
};
use rand::seq::SliceRandom;

use crate::evaluate::{
  evaluate, has_port_conflict, port_set_differs, Evaluation,
};
use crate::rolling::order::resolve_update_order;
use crate::rolling::ensure_volumes;
use crate::scheduler::{has_capacity, reserve};

/// `evaluate` alone can't see ports (§6 "port labels" aren't part of
/// `EffectiveSpec`); a port-set change on an otherwise-identical spec
/// still requires a recreate (§4.1 "Recreate-required" fields include
/// the container's published ports).
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

/// One machine's view going into step 8's round robin: its cluster index,
/// and the queue of this service's running containers there (head-first,
/// `UpToDate` sorted ahead per step 6).
struct MachineSlot<'a> {
  position: usize,
  containers: Vec<&'a Container>,
}

#[allow(clippy::too_many_arguments)]
pub fn plan_replicated(
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

  // Step 3: randomize machine order to avoid hot spots across deploys.
  let mut order: Vec<usize> = eligible.to_vec();
  order.shuffle(&mut rand::rng());

  // Step 4: partition running containers by machine; non-running ones are
  // handled in step 9 alongside any other unclaimed container.
  let mut slots: Vec<MachineSlot> = order
    .into_iter()
    .map(|position| MachineSlot { position, containers: Vec::new() })
    .collect();

  for sc in existing {
    if !sc.container.state.is_running() {
      continue;
    }
    if let Some(slot) = slots
      .iter_mut()
      .find(|s| machines[s.position].machine.id == sc.machine_id)
    {
      slot.containers.push(&sc.container);
    }
  }

  // Step 5-6: classify each running container, then stably sort
  // `UpToDate` ahead of the rest within its machine.
  for slot in &mut slots {
    slot.containers.sort_by_key(|c| {
      match classify(c, desired, desired_ports, force_recreate) {
        Evaluation::UpToDate => 0,
        _ => 1,
      }
    });
  }

  // Step 7: re-sort machines by (most UpToDate first, then most existing
  // containers).
  slots.sort_by_key(|slot| {
    let up_to_date = slot
      .containers
      .iter()
      .filter(|c| {
        classify(c, desired, desired_ports, force_recreate)
          == Evaluation::UpToDate
      })
      .count();
    (std::cmp::Reverse(up_to_date), std::cmp::Reverse(slot.containers.len()))
  });

  let mut claimed: HashSet<String> = HashSet::new();

  // Step 8: round robin across the ordered machine list.
  let replicas = spec.replicas() as usize;
  for i in 0..replicas {
    if slots.is_empty() {
      break;
    }
    let slot_idx = i % slots.len();

    if slots[slot_idx].containers.is_empty() {
      // Brand new placement: a round-robin wrap can revisit a machine
      // already holding earlier replicas from this same call, so check
      // its updated capacity instead of blindly trusting the slot order
      // (§2 "C5 calls C4 for scheduling", §4.3 "Resource").
      let chosen_idx = find_slot_with_capacity(
        &slots,
        machines,
        slot_idx,
        cpu_nanos,
        memory_bytes,
      )
      .unwrap_or(slot_idx);
      let position = slots[chosen_idx].position;
      let entry = &mut machines[position];
      reserve(entry, cpu_nanos, memory_bytes);
      let machine_id = entry.machine.id.clone();
      ensure_volumes(&mut plan, entry, &machine_id, &desired.volumes);
      plan.push(Operation::Run {
        machine_id,
        spec: desired.container.clone(),
        ports: desired_ports.to_vec(),
      });
      continue;
    }

    let slot = &mut slots[slot_idx];
    let machine_id = machines[slot.position].machine.id.clone();

    match slot.containers.first().copied() {
      None => unreachable!("emptiness checked above"),
      Some(container) => {
        slot.containers.remove(0);
        claimed.insert(container.id.clone());
        match classify(container, desired, desired_ports, force_recreate) {
          Evaluation::UpToDate => {}
          Evaluation::NeedsUpdate => {
            plan.push(Operation::UpdateSpec {
              machine_id,
              container_id: container.id.clone(),
              new_spec: desired.container.clone(),
            });
          }
          Evaluation::NeedsRecreate => {
            let order = update_order_for(
              container,
              desired_ports,
              spec,
              &desired.volumes,
            );
            let position = slot.position;
            ensure_volumes(
              &mut plan,
              &mut machines[position],
              &machine_id,
              &desired.volumes,
            );
            plan.push(Operation::Replace {
              machine_id,
              old_container: container.clone(),
              spec: desired.container.clone(),
              ports: desired_ports.to_vec(),
              order,
            });
          }
        }
      }
    }
  }

  // Step 9: anything left unclaimed (including non-running containers,
  // which were never placed into a slot at all) is removed.
  for sc in existing {
    if claimed.contains(&sc.container.id) {
      continue;
    }
    plan.push(Operation::Remove {
      machine_id: sc.machine_id.clone(),
      container: sc.container.clone(),
    });
  }

  plan
}

/// Starting at `start`, scans the slot list (wrapping) for the first
/// machine with room for one more container's reservation. Falls back to
/// `start` itself if none has room, so a genuinely over-requested deploy
/// still produces a plan rather than silently dropping a replica.
fn find_slot_with_capacity(
  slots: &[MachineSlot],
  machines: &[MachineEntry],
  start: usize,
  cpu_nanos: u64,
  memory_bytes: u64,
) -> Option<usize> {
  let n = slots.len();
  (0..n)
    .map(|offset| (start + offset) % n)
    .find(|&idx| has_capacity(&machines[slots[idx].position], cpu_nanos, memory_bytes))
}

fn update_order_for(
  container: &Container,
  desired_ports: &[PortSpec],
  spec: &ServiceSpec,
  desired_volumes: &[cluster_client::VolumeSpec],
) -> UpdateOrder {
  if has_port_conflict(&container.ports, desired_ports) {
    return UpdateOrder::StopFirst;
  }
  resolve_update_order(
    &spec.update_config,
    &container.ports,
    desired_ports,
    spec.replicas(),
    desired_volumes,
  )
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

  fn spec_with_replicas(replicas: u32) -> ServiceSpec {
    ServiceSpec {
      name: "web".to_string(),
      namespace: "default".to_string(),
      mode: ServiceMode::Replicated,
      container: desired_effective("nginx:1.25").container,
      replicas,
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
  fn new_deploy_runs_on_every_eligible_machine() {
    let mut machines = vec![machine_entry("m1"), machine_entry("m2")];
    let desired = desired_effective("nginx:1.25");
    let spec = spec_with_replicas(2);
    let plan = plan_replicated(
      &mut machines,
      &[0, 1],
      &[],
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
      false,
      0,
      0,
    );
    assert_eq!(plan.operations.len(), 2);
    assert!(plan
      .operations
      .iter()
      .all(|op| matches!(op, Operation::Run { .. })));
  }

  #[test]
  fn scale_down_removes_extras() {
    let mut machines = vec![machine_entry("m1")];
    let desired = desired_effective("nginx:1.25");
    let spec = spec_with_replicas(1);
    let container = |id: &str| Container {
      id: id.to_string(),
      state: ContainerState::Running { health: None },
      spec: desired.clone(),
      service_labels: ServiceLabels {
        service_id: "svc1".to_string(),
        service_name: "web".to_string(),
        mode: ServiceMode::Replicated,
      },
      ports: vec![],
    };
    let existing = vec![
      ServiceContainer { machine_id: "m1".to_string(), container: container("c1") },
      ServiceContainer { machine_id: "m1".to_string(), container: container("c2") },
      ServiceContainer { machine_id: "m1".to_string(), container: container("c3") },
    ];
    let plan = plan_replicated(
      &mut machines,
      &[0],
      &existing,
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
      false,
      0,
      0,
    );
    let removes =
      plan.operations.iter().filter(|op| matches!(op, Operation::Remove { .. })).count();
    let runs =
      plan.operations.iter().filter(|op| matches!(op, Operation::Run { .. })).count();
    assert_eq!(removes, 2);
    assert_eq!(runs, 0);
  }

  #[test]
  fn label_change_recreates_via_replace() {
    let mut machines = vec![machine_entry("m1")];
    let mut desired = desired_effective("nginx:1.25");
    desired.container.labels.insert("app".to_string(), "new".to_string());
    let spec = spec_with_replicas(1);
    let mut current = desired.clone();
    current.container.labels.insert("app".to_string(), "old".to_string());
    let container = Container {
      id: "c1".to_string(),
      state: ContainerState::Running { health: None },
      spec: current,
      service_labels: ServiceLabels {
        service_id: "svc1".to_string(),
        service_name: "web".to_string(),
        mode: ServiceMode::Replicated,
      },
      ports: vec![],
    };
    let existing =
      vec![ServiceContainer { machine_id: "m1".to_string(), container }];
    let plan = plan_replicated(
      &mut machines,
      &[0],
      &existing,
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
      false,
      0,
      0,
    );
    assert_eq!(plan.operations.len(), 1);
    assert!(matches!(plan.operations[0], Operation::Replace { .. }));
  }

  #[test]
  fn deploy_labels_only_change_updates_spec() {
    let mut machines = vec![machine_entry("m1")];
    let mut desired = desired_effective("nginx:1.25");
    desired.deploy_labels.insert("version".to_string(), "v2".to_string());
    let spec = spec_with_replicas(1);
    let mut current = desired.clone();
    current.deploy_labels.insert("version".to_string(), "v1".to_string());
    let container = Container {
      id: "c1".to_string(),
      state: ContainerState::Running { health: None },
      spec: current,
      service_labels: ServiceLabels {
        service_id: "svc1".to_string(),
        service_name: "web".to_string(),
        mode: ServiceMode::Replicated,
      },
      ports: vec![],
    };
    let existing =
      vec![ServiceContainer { machine_id: "m1".to_string(), container }];
    let plan = plan_replicated(
      &mut machines,
      &[0],
      &existing,
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
      false,
      0,
      0,
    );
    assert_eq!(plan.operations.len(), 1);
    assert!(matches!(plan.operations[0], Operation::UpdateSpec { .. }));
  }

  fn machine_entry_with_capacity(id: &str, cpu_nanos: u64) -> MachineEntry {
    MachineEntry::new(Machine {
      id: id.to_string(),
      name: id.to_string(),
      total_cpu_nanos: cpu_nanos,
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
  fn round_robin_wrap_does_not_overcommit_a_machine() {
    // Two machines, each with room for exactly one container; three
    // replicas means the round robin (len 2) wraps back to index 0 on
    // its third iteration. Without a capacity check at that wrap, the
    // machine landing on index 0 would get reserved twice over.
    let mut machines = vec![
      machine_entry_with_capacity("m1", 1_000_000_000),
      machine_entry_with_capacity("m2", 1_000_000_000),
    ];
    let desired = desired_effective("nginx:1.25");
    let spec = spec_with_replicas(3);
    let plan = plan_replicated(
      &mut machines,
      &[0, 1],
      &[],
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
      false,
      1_000_000_000,
      0,
    );
    assert_eq!(
      plan.operations.iter().filter(|op| matches!(op, Operation::Run { .. })).count(),
      3
    );
    for entry in &machines {
      assert!(entry.scheduled_cpu_nanos <= entry.machine.total_cpu_nanos);
    }
  }

  #[test]
  fn fresh_deploy_provisions_a_missing_named_volume() {
    let mut machines = vec![machine_entry("m1")];
    let mut desired = desired_effective("nginx:1.25");
    desired.volumes.push(VolumeSpec {
      name: "data".to_string(),
      kind: VolumeKind::Named {
        driver: String::new(),
        driver_opts: IndexMap::new(),
      },
    });
    let spec = spec_with_replicas(1);
    let plan = plan_replicated(
      &mut machines,
      &[0],
      &[],
      &desired,
      &[],
      &spec,
      "svc1",
      "web",
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
