//! The declarative service spec a client submits (§3 "Service spec").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top level declarative input to a deploy. Ephemeral: it exists for the
/// duration of one `resolve` + `plan` call and is never persisted as-is
/// (the persisted half is [`crate::entities::service::Service`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
  /// If empty, [`crate::resolve::ServiceSpecResolver`] derives one from
  /// the image name plus a random suffix.
  #[serde(default)]
  pub name: String,
  #[serde(default = "default_namespace")]
  pub namespace: String,
  #[serde(default)]
  pub mode: ServiceMode,
  pub container: ContainerSpec,
  /// Meaningful only in `replicated` mode; ignored for `global` (§3).
  #[serde(default)]
  pub replicas: u32,
  #[serde(default)]
  pub volumes: Vec<VolumeSpec>,
  #[serde(default)]
  pub ports: Vec<PortSpec>,
  #[serde(default)]
  pub placement: Placement,
  #[serde(default)]
  pub update_config: UpdateConfig,
  /// Labels that may change without forcing a recreate (§4.1 "Update-only").
  #[serde(default)]
  pub deploy_labels: IndexMap<String, String>,
}

pub fn default_namespace() -> String {
  "default".to_string()
}

pub const DEFAULT_NAMESPACE: &str = "default";
pub const SYSTEM_NAMESPACE: &str = "uncloud-system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
  Replicated,
  Global,
}

impl Default for ServiceMode {
  fn default() -> Self {
    ServiceMode::Replicated
  }
}

impl ServiceSpec {
  pub const DEFAULT_REPLICAS: u32 = 1;

  /// Effective replica count: defaults to 1 if unset. `resolve` (C2) also
  /// writes this default back onto the spec so it round-trips, but
  /// callers that skip `resolve` still get a sane value here.
  pub fn replicas(&self) -> u32 {
    if self.replicas == 0 {
      Self::DEFAULT_REPLICAS
    } else {
      self.replicas
    }
  }

  /// The subset of fields the evaluator (C1) diffs, as its own value type
  /// so a running container can carry exactly this much of the spec it
  /// was created from without also carrying name/mode/replicas, which
  /// aren't per-container concerns.
  pub fn effective(&self) -> EffectiveSpec {
    EffectiveSpec {
      namespace: self.namespace.clone(),
      container: self.container.clone(),
      volumes: self.volumes.clone(),
      placement: self.placement.clone(),
      deploy_labels: self.deploy_labels.clone(),
    }
  }
}

/// The spec a container was actually created from (§3 "Container" —
/// "embedded effective spec"), carrying only what the evaluator (C1)
/// compares. Ports are tracked separately on the container as "port
/// labels" (§6) since they survive store loss independent of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveSpec {
  pub namespace: String,
  pub container: ContainerSpec,
  pub volumes: Vec<VolumeSpec>,
  pub placement: Placement,
  pub deploy_labels: IndexMap<String, String>,
}

/// Container-level configuration. Recreate-required fields (§4.1) live here
/// alongside the update-only resource knobs; the evaluator decides which
/// bucket each field falls in, this struct just carries the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
  pub image: String,
  #[serde(default)]
  pub command: Vec<String>,
  #[serde(default)]
  pub entrypoint: Vec<String>,
  /// Ordered so deterministic serialization round-trips; compared as a set
  /// by the evaluator (§4.1 "env").
  #[serde(default)]
  pub env: IndexMap<String, String>,
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub labels: IndexMap<String, String>,
  #[serde(default)]
  pub privileged: bool,
  #[serde(default)]
  pub sysctls: IndexMap<String, String>,
  #[serde(default)]
  pub pull_policy: PullPolicy,
  #[serde(default)]
  pub cap_add: Vec<String>,
  #[serde(default)]
  pub cap_drop: Vec<String>,
  #[serde(default)]
  pub resources: Resources,
  #[serde(default)]
  pub volume_mounts: Vec<VolumeMount>,
  #[serde(default)]
  pub log_driver: LogDriverSpec,
  #[serde(default)]
  pub health_check: Option<HealthCheck>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
  Always,
  #[default]
  Missing,
  Never,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
  #[serde(default)]
  pub cpu_nanos: u64,
  #[serde(default)]
  pub memory_bytes: u64,
  #[serde(default)]
  pub cpu_reservation_nanos: u64,
  #[serde(default)]
  pub memory_reservation_bytes: u64,
  #[serde(default)]
  pub devices: Vec<DeviceMapping>,
  #[serde(default)]
  pub device_reservations: Vec<DeviceReservation>,
  #[serde(default)]
  pub ulimits: IndexMap<String, Ulimit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
  pub path_on_host: String,
  pub path_in_container: String,
  #[serde(default)]
  pub cgroup_permissions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReservation {
  #[serde(default)]
  pub driver: String,
  pub count: i64,
  #[serde(default)]
  pub capabilities: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
  pub soft: i64,
  pub hard: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
  pub volume_name: String,
  pub container_path: String,
  #[serde(default)]
  pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogDriverSpec {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub options: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
  #[serde(default)]
  pub test: Vec<String>,
  #[serde(default)]
  pub interval_nanos: i64,
  #[serde(default)]
  pub timeout_nanos: i64,
  #[serde(default)]
  pub retries: i64,
  #[serde(default)]
  pub start_period_nanos: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
  pub name: String,
  pub kind: VolumeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VolumeKind {
  Named {
    #[serde(default)]
    driver: String,
    #[serde(default)]
    driver_opts: IndexMap<String, String>,
  },
  Bind {
    host_path: String,
    #[serde(default)]
    propagation: BindPropagation,
  },
  Tmpfs {
    #[serde(default)]
    size_bytes: Option<u64>,
  },
}

/// See DESIGN.md "open questions": `Rprivate` is treated as equal to
/// `Empty` by the evaluator's volume-equality check, since it's Docker's
/// documented default for bind mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindPropagation {
  #[default]
  Empty,
  Private,
  Rprivate,
  Shared,
  Rshared,
  Slave,
  Rslave,
}

impl BindPropagation {
  /// Normalizes `Rprivate` down to `Empty` for comparison purposes only.
  pub fn normalized(self) -> BindPropagation {
    match self {
      BindPropagation::Rprivate => BindPropagation::Empty,
      other => other,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
  pub container_port: u16,
  /// `0` means "not yet assigned"; the resolver (C2) fills this in for
  /// unset `tcp`/ingress ports.
  #[serde(default)]
  pub published_port: u16,
  pub protocol: Protocol,
  #[serde(default)]
  pub mode: PortMode,
  #[serde(default)]
  pub hostname: Option<String>,
}

impl PortSpec {
  /// Key used for both port-set equality (§4.1) and port-conflict checks
  /// (§4.5.3).
  pub fn identity_key(
    &self,
  ) -> (u16, u16, Protocol, PortMode, Option<&str>) {
    (
      self.container_port,
      self.published_port,
      self.protocol,
      self.mode,
      self.hostname.as_deref(),
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
  Tcp,
  Udp,
  Http,
  Https,
}

impl Protocol {
  pub fn is_http_family(self) -> bool {
    matches!(self, Protocol::Http | Protocol::Https)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
  #[default]
  Ingress,
  Host,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
  /// Allow-list of machine names or IDs. Empty means unconstrained.
  #[serde(default)]
  pub machines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
  #[serde(default)]
  pub order: Option<UpdateOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrder {
  StartFirst,
  StopFirst,
}
