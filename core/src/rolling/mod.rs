//! C5: the rolling deployment strategy (§4.5). `plan` dispatches on
//! `ServiceMode`; the two concrete strategies live in sibling modules.

pub mod global;
pub mod order;
pub mod replicated;

use cluster_client::{
  EffectiveSpec, MachineEntry, MachineVolume, Operation, Plan, PortSpec,
  ServiceContainer, ServiceMode, ServiceSpec, VolumeKind, VolumeSpec,
};

use crate::error::Error;

/// `plan(state, svc, spec)` (§4.5). `eligible` is the output of C4's
/// `EligibleMachines()`, `existing` the service's current containers
/// wherever they live, `desired` the resolved spec's comparison view
/// (see [`cluster_client::ServiceSpec::effective`]), and `desired_ports`
/// its resolved port list. `machines` is mutable: C5 calls into C4's
/// reservation bookkeeping (§2 "C5 calls C4 for scheduling") as it places
/// each new container, so a replicated deploy that wraps round-robin back
/// onto an already-used machine sees that machine's updated capacity.
#[allow(clippy::too_many_arguments)]
pub fn plan(
  machines: &mut [MachineEntry],
  eligible: &[usize],
  existing: &[ServiceContainer],
  desired: &EffectiveSpec,
  desired_ports: &[PortSpec],
  spec: &ServiceSpec,
  service_id: &str,
  service_name: &str,
  force_recreate: bool,
) -> Result<Plan, Error> {
  let cpu_nanos = spec.container.resources.cpu_reservation_nanos;
  let memory_bytes = spec.container.resources.memory_reservation_bytes;
  match spec.mode {
    ServiceMode::Replicated => Ok(replicated::plan_replicated(
      machines,
      eligible,
      existing,
      desired,
      desired_ports,
      spec,
      service_id,
      service_name,
      force_recreate,
      cpu_nanos,
      memory_bytes,
    )),
    ServiceMode::Global => Ok(global::plan_global(
      machines,
      eligible,
      existing,
      desired,
      desired_ports,
      spec,
      service_id,
      service_name,
      force_recreate,
      cpu_nanos,
      memory_bytes,
    )),
  }
}

/// For any declared named volume missing from the chosen machine, emits a
/// `CreateVolume` ahead of the container placement and records it in the
/// machine's transient `scheduled_volumes` (§4.3 "Volume" constraint),
/// so the same planning call can place a second container needing the
/// same volume on that machine without re-provisioning it.
pub(crate) fn ensure_volumes(
  plan: &mut Plan,
  entry: &mut MachineEntry,
  machine_id: &str,
  volumes: &[VolumeSpec],
) {
  for volume in volumes {
    let VolumeKind::Named { driver, driver_opts } = &volume.kind else {
      continue;
    };
    if entry.has_volume(&volume.name).is_some() {
      continue;
    }
    plan.push(Operation::CreateVolume {
      machine_id: machine_id.to_string(),
      volume: volume.clone(),
    });
    entry.scheduled_volumes.push(MachineVolume {
      name: volume.name.clone(),
      driver: driver.clone(),
      driver_opts: driver_opts.clone(),
    });
  }
}
