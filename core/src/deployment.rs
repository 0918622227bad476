//! The inbound façade (§6): `Deployment.Plan` / `.Run`, wiring C1–C5
//! together over one adapter. Grounded on the lifecycle shape of the
//! teacher's `bin/core/src/resource/server.rs` (validate -> resolve
//! current state -> act -> log), minus the database persistence step
//! this crate has no equivalent of.

use cluster_client::{
  EffectiveSpec, Machine, Plan, Service, ServiceContainer, ServiceSpec,
  UpdateOrder,
};
use tracing::{info, instrument, warn};

use crate::adapters::ContainerClient;
use crate::error::{Error, ExecutionError, Result};
use crate::rolling;
use crate::scheduler::Scheduler;
use crate::state::{self, constraints_from_spec};

/// Everything one `plan`/`run` call needs about the cluster and the
/// service being deployed. The caller assembles this from its own
/// `MachineClient`/`ServiceClient` lookups; snapshotting those into a
/// `ClusterState` is C3's job (`state::snapshot`), kept separate so this
/// façade doesn't have to know how machines/services are listed.
pub struct DeployRequest<'a> {
  pub service_id: &'a str,
  pub service_name: &'a str,
  pub spec: &'a ServiceSpec,
  pub existing: &'a [ServiceContainer],
  pub force_recreate: bool,
}

pub struct Deployment<C: ContainerClient> {
  client: C,
}

impl<C: ContainerClient> Deployment<C> {
  pub fn new(client: C) -> Self {
    Deployment { client }
  }

  /// `Deployment.Plan(ctx)` (§6): pure, never touches the cluster.
  #[instrument(skip_all, fields(service_id = req.service_id, service_name = req.service_name, mode = ?req.spec.mode))]
  pub fn plan(
    &self,
    machines: impl IntoIterator<Item = Machine>,
    existing_container_counts: impl Fn(&str) -> usize,
    desired_ports: &[cluster_client::PortSpec],
    req: &DeployRequest,
  ) -> Result<Plan> {
    let mut cluster = state::snapshot(machines, existing_container_counts);
    if cluster.machines.is_empty() {
      warn!("no reachable machines in the cluster");
      return Err(Error::NoReachableMachines);
    }
    let constraints =
      constraints_from_spec(&req.spec.placement, &req.spec.container);

    let eligible = {
      let scheduler = Scheduler::new(
        &mut cluster.machines,
        constraints,
        req.spec.container.resources.cpu_reservation_nanos,
        req.spec.container.resources.memory_reservation_bytes,
      );
      scheduler.eligible_machines().map_err(|report| {
        warn!("no eligible machines for this service | {report}");
        Error::NoMatchingMachines { report }
      })?
    };

    let desired: EffectiveSpec = req.spec.effective();
    let plan = rolling::plan(
      &mut cluster.machines,
      &eligible,
      req.existing,
      &desired,
      desired_ports,
      req.spec,
      req.service_id,
      req.service_name,
      req.force_recreate,
    )?;

    info!("plan produced | {} operations", plan.operations.len());
    Ok(plan)
  }

  /// `Deployment.Run(ctx)` (§6): executes a plan sequentially, aborting
  /// at the first failing operation (§4.5.4, §7 "Execution errors").
  #[instrument(skip_all, fields(service_id = %plan.service_id, operations = plan.operations.len()))]
  pub async fn run(
    &self,
    plan: &Plan,
  ) -> std::result::Result<(), ExecutionError> {
    for op in &plan.operations {
      self.execute(op).await.map_err(|source| ExecutionError {
        operation_kind: op.kind(),
        machine_id: op.machine_id().to_string(),
        source,
      })?;
    }
    Ok(())
  }

  async fn execute(
    &self,
    op: &cluster_client::Operation,
  ) -> anyhow::Result<()> {
    use cluster_client::Operation::*;
    match op {
      Run { spec, ports, .. } => {
        let container = self.client.create_container(spec, ports).await?;
        self.client.start_container(&container.id).await
      }
      Stop { container_id, .. } => {
        self.client.stop_container(container_id).await
      }
      Remove { container, .. } => {
        let _ = self.client.stop_container(&container.id).await;
        self.client.remove_container(&container.id).await
      }
      Replace { old_container, spec, ports, order, .. } => {
        self.execute_replace(old_container, spec, ports, *order).await
      }
      UpdateSpec { container_id, new_spec, .. } => {
        self.client.update_container_spec(container_id, new_spec).await
      }
      CreateVolume { volume, .. } => self.client.create_volume(volume).await,
    }
  }

  async fn execute_replace(
    &self,
    old_container: &cluster_client::Container,
    spec: &cluster_client::ContainerSpec,
    ports: &[cluster_client::PortSpec],
    order: UpdateOrder,
  ) -> anyhow::Result<()> {
    match order {
      UpdateOrder::StartFirst => {
        let container = self.client.create_container(spec, ports).await?;
        self.client.start_container(&container.id).await?;
        let _ = self.client.stop_container(&old_container.id).await;
        self.client.remove_container(&old_container.id).await
      }
      UpdateOrder::StopFirst => {
        let _ = self.client.stop_container(&old_container.id).await;
        self.client.remove_container(&old_container.id).await?;
        let container = self.client.create_container(spec, ports).await?;
        self.client.start_container(&container.id).await
      }
    }
  }
}

/// Resolves a namespace conflict error (§6 "State-mismatch" errors):
/// used by a caller's `ServiceClient::inspect_service` lookup before
/// calling `plan`, to enforce "only one service with a given (namespace,
/// name) may exist" (§3 "Invariants").
pub fn check_namespace(
  service: Option<&Service>,
  requested_namespace: &str,
) -> Result<()> {
  match service {
    Some(svc) if svc.namespace != requested_namespace => {
      Err(Error::NamespaceMismatch {
        name: svc.name.clone(),
        existing_namespace: svc.namespace.clone(),
        requested_namespace: requested_namespace.to_string(),
      })
    }
    _ => Ok(()),
  }
}
