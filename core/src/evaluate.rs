//! C1: classifies a running container against a desired spec (§4.1).
//!
//! Grounded on the status-computation shape in the teacher's
//! `bin/core/src/monitor/helpers.rs` (several independent "does this
//! differ" checks folded into one status enum) — same idea, applied to
//! container specs instead of resource config documents.

use cluster_client::{
  ContainerSpec, EffectiveSpec, Placement, PortSpec, VolumeKind, VolumeMount,
  VolumeSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
  UpToDate,
  NeedsUpdate,
  NeedsRecreate,
}

/// `evaluate(current, desired)` (§4.1). `force_recreate` lets the rolling
/// planner (C5) coerce an otherwise-`UpToDate`/`NeedsUpdate` verdict when
/// it has an independent reason to recreate (e.g. a port conflict).
pub fn evaluate(
  current: &EffectiveSpec,
  desired: &EffectiveSpec,
  force_recreate: bool,
) -> Evaluation {
  if force_recreate {
    return Evaluation::NeedsRecreate;
  }
  if recreate_required_differs(current, desired) {
    return Evaluation::NeedsRecreate;
  }
  if update_only_differs(current, desired) {
    return Evaluation::NeedsUpdate;
  }
  Evaluation::UpToDate
}

fn recreate_required_differs(
  current: &EffectiveSpec,
  desired: &EffectiveSpec,
) -> bool {
  current.namespace != desired.namespace
    || !placement_eq(&current.placement, &desired.placement)
    || !volume_multiset(&current.volumes).eq(&volume_multiset(&desired.volumes))
    || container_recreate_required_differs(&current.container, &desired.container)
}

fn container_recreate_required_differs(
  current: &ContainerSpec,
  desired: &ContainerSpec,
) -> bool {
  current.image != desired.image
    || current.command != desired.command
    || current.entrypoint != desired.entrypoint
    || current.env != desired.env
    || current.user != desired.user
    || current.labels != desired.labels
    || current.privileged != desired.privileged
    || current.sysctls != desired.sysctls
    || !capability_set_eq(&current.cap_add, &desired.cap_add)
    || !capability_set_eq(&current.cap_drop, &desired.cap_drop)
    || !mount_multiset(&current.volume_mounts)
      .eq(&mount_multiset(&desired.volume_mounts))
    || current.log_driver != desired.log_driver
    || current.health_check != desired.health_check
    || current.resources.devices != desired.resources.devices
    || current.resources.device_reservations
      != desired.resources.device_reservations
    || current.resources.ulimits != desired.resources.ulimits
}

fn update_only_differs(
  current: &EffectiveSpec,
  desired: &EffectiveSpec,
) -> bool {
  let r1 = &current.container.resources;
  let r2 = &desired.container.resources;
  r1.cpu_nanos != r2.cpu_nanos
    || r1.memory_bytes != r2.memory_bytes
    || r1.cpu_reservation_nanos != r2.cpu_reservation_nanos
    || r1.memory_reservation_bytes != r2.memory_reservation_bytes
    || current.deploy_labels != desired.deploy_labels
}

/// Ports aren't part of [`EffectiveSpec`] (they're tracked as "port
/// labels" on the container, independent of the spec that created it —
/// §6); callers compare them with this separately, against the
/// container's recorded port list.
pub fn port_set_differs(current: &[PortSpec], desired: &[PortSpec]) -> bool {
  port_multiset(current) != port_multiset(desired)
}

pub fn has_port_conflict(current: &[PortSpec], desired: &[PortSpec]) -> bool {
  current.iter().any(|c| {
    desired.iter().any(|d| {
      c.published_port != 0
        && c.published_port == d.published_port
        && c.protocol == d.protocol
        && c.mode == d.mode
    })
  })
}

fn placement_eq(a: &Placement, b: &Placement) -> bool {
  placement_set(a) == placement_set(b)
}

fn placement_set(p: &Placement) -> Vec<&str> {
  let mut machines: Vec<&str> = p.machines.iter().map(String::as_str).collect();
  machines.sort_unstable();
  machines
}

fn capability_set_eq(a: &[String], b: &[String]) -> bool {
  capability_set(a) == capability_set(b)
}

fn capability_set(caps: &[String]) -> Vec<&str> {
  let mut caps: Vec<&str> = caps.iter().map(String::as_str).collect();
  caps.sort_unstable();
  caps
}

fn mount_multiset(mounts: &[VolumeMount]) -> Vec<String> {
  let mut keys: Vec<String> = mounts
    .iter()
    .map(|m| format!("{:?}", (&m.volume_name, &m.container_path, m.read_only)))
    .collect();
  keys.sort();
  keys
}

fn port_multiset(ports: &[PortSpec]) -> Vec<String> {
  let mut keys: Vec<String> =
    ports.iter().map(|p| format!("{:?}", p.identity_key())).collect();
  keys.sort();
  keys
}

fn volume_multiset(volumes: &[VolumeSpec]) -> Vec<String> {
  let mut keys: Vec<String> =
    volumes.iter().map(|v| format!("{:?}", normalized_volume(v))).collect();
  keys.sort();
  keys
}

fn normalized_volume(volume: &VolumeSpec) -> VolumeSpec {
  let mut volume = volume.clone();
  if let VolumeKind::Bind { propagation, .. } = &mut volume.kind {
    *propagation = propagation.normalized();
  }
  volume
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::{ContainerSpec, PullPolicy, Resources};
  use indexmap::IndexMap;

  fn base() -> EffectiveSpec {
    EffectiveSpec {
      namespace: "default".to_string(),
      container: ContainerSpec {
        image: "nginx:1.25".to_string(),
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

  #[test]
  fn reflexive() {
    let spec = base();
    assert_eq!(evaluate(&spec, &spec, false), Evaluation::UpToDate);
  }

  #[test]
  fn image_change_recreates() {
    let current = base();
    let mut desired = base();
    desired.container.image = "nginx:1.26".to_string();
    assert_eq!(
      evaluate(&current, &desired, false),
      Evaluation::NeedsRecreate
    );
  }

  #[test]
  fn label_change_recreates() {
    let current = base();
    let mut desired = base();
    desired
      .container
      .labels
      .insert("app".to_string(), "new".to_string());
    assert_eq!(
      evaluate(&current, &desired, false),
      Evaluation::NeedsRecreate
    );
  }

  #[test]
  fn deploy_labels_change_only_updates() {
    let mut current = base();
    current
      .deploy_labels
      .insert("version".to_string(), "v1".to_string());
    let mut desired = base();
    desired
      .deploy_labels
      .insert("version".to_string(), "v2".to_string());
    assert_eq!(
      evaluate(&current, &desired, false),
      Evaluation::NeedsUpdate
    );
  }

  #[test]
  fn resource_limit_change_updates() {
    let current = base();
    let mut desired = base();
    desired.container.resources.cpu_nanos = 500_000_000;
    assert_eq!(
      evaluate(&current, &desired, false),
      Evaluation::NeedsUpdate
    );
  }

  #[test]
  fn pull_policy_ignored() {
    let current = base();
    let mut desired = base();
    desired.container.pull_policy = PullPolicy::Always;
    assert_eq!(evaluate(&current, &desired, false), Evaluation::UpToDate);
  }

  #[test]
  fn force_recreate_overrides() {
    let spec = base();
    assert_eq!(evaluate(&spec, &spec, true), Evaluation::NeedsRecreate);
  }
}
