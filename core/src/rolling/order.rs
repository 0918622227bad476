//! Update-order policy (§4.5.3): how to sequence the new container
//! relative to the one it replaces.

use cluster_client::{PortSpec, UpdateConfig, UpdateOrder, VolumeKind, VolumeSpec};

use crate::evaluate::has_port_conflict;

pub fn resolve_update_order(
  update_config: &UpdateConfig,
  old_ports: &[PortSpec],
  new_ports: &[PortSpec],
  replicas: u32,
  volumes: &[VolumeSpec],
) -> UpdateOrder {
  if let Some(order) = update_config.order {
    return order;
  }
  if has_port_conflict(old_ports, new_ports) {
    return UpdateOrder::StopFirst;
  }
  if replicas <= 1 && has_named_volume(volumes) {
    return UpdateOrder::StopFirst;
  }
  UpdateOrder::StartFirst
}

fn has_named_volume(volumes: &[VolumeSpec]) -> bool {
  volumes.iter().any(|v| matches!(v.kind, VolumeKind::Named { .. }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::{PortMode, Protocol};

  #[test]
  fn explicit_config_wins() {
    let cfg = UpdateConfig { order: Some(UpdateOrder::StopFirst) };
    assert_eq!(
      resolve_update_order(&cfg, &[], &[], 3, &[]),
      UpdateOrder::StopFirst
    );
  }

  #[test]
  fn port_conflict_forces_stop_first() {
    let cfg = UpdateConfig::default();
    let port = PortSpec {
      container_port: 80,
      published_port: 8080,
      protocol: Protocol::Tcp,
      mode: PortMode::Host,
      hostname: None,
    };
    assert_eq!(
      resolve_update_order(&cfg, &[port.clone()], &[port], 3, &[]),
      UpdateOrder::StopFirst
    );
  }

  #[test]
  fn single_replica_named_volume_forces_stop_first() {
    let cfg = UpdateConfig::default();
    let volumes = vec![VolumeSpec {
      name: "data".to_string(),
      kind: VolumeKind::Named {
        driver: String::new(),
        driver_opts: Default::default(),
      },
    }];
    assert_eq!(
      resolve_update_order(&cfg, &[], &[], 1, &volumes),
      UpdateOrder::StopFirst
    );
  }

  #[test]
  fn default_is_start_first() {
    let cfg = UpdateConfig::default();
    assert_eq!(
      resolve_update_order(&cfg, &[], &[], 3, &[]),
      UpdateOrder::StartFirst
    );
  }
}
