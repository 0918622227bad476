//! C2: the spec resolver (§4.2). Fills defaults, synthesizes names,
//! expands ingress hostnames, and allocates random TCP ingress ports.
//!
//! Grounded on the four-step "Validate -> Defaults -> Name -> ...
//! expansion" pipeline the spec lays out; structurally this plays the
//! same role the teacher's `ServiceSpecResolver`-shaped config-merge
//! pipelines do in `bin/periphery/src/config.rs` (several independently
//! sourced fields, combined under one precedence order), just over a
//! single spec instead of CLI-args/env/file.

use std::collections::HashSet;

use rand::Rng;

use crate::entities::spec::{
  DEFAULT_NAMESPACE, PortMode, PortSpec, Protocol, ServiceSpec,
  SYSTEM_NAMESPACE,
};
use crate::validate::{self, ValidationError};

pub const TCP_INGRESS_PORT_MIN: u16 = 30000;
pub const TCP_INGRESS_PORT_MAX: u16 = 39999;
const RANDOM_ALLOCATION_ATTEMPTS: u32 = 100;
const NAME_SUFFIX_LEN: usize = 4;
const NAME_SUFFIX_ALPHABET: &[u8] =
  b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error("port {container_port}: no available TCP ports in [{TCP_INGRESS_PORT_MIN}, {TCP_INGRESS_PORT_MAX}]")]
  NoAvailableTcpPorts { container_port: u16 },
}

/// The cluster-wide knobs `resolve` needs. Owned by the caller and passed
/// in explicitly — no global mutable state (§9).
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
  pub cluster_domain: Option<String>,
}

/// `UsedTCPPorts` from §4.2 — the caller owns this set across calls to
/// prevent two services in the same resolution pass from colliding; a
/// fresh resolve against the live cluster would be seeded with every port
/// already in use.
pub struct ServiceSpecResolver<'a> {
  ctx: &'a ResolveContext,
  used_tcp_ports: &'a mut HashSet<u16>,
}

impl<'a> ServiceSpecResolver<'a> {
  pub fn new(
    ctx: &'a ResolveContext,
    used_tcp_ports: &'a mut HashSet<u16>,
  ) -> Self {
    ServiceSpecResolver { ctx, used_tcp_ports }
  }

  pub fn resolve(
    &mut self,
    mut spec: ServiceSpec,
  ) -> Result<ServiceSpec, ResolveError> {
    validate::validate_structure(&spec)?;

    apply_defaults(&mut spec);
    assign_name(&mut spec);
    expand_ingress_hostnames(&mut spec, self.ctx)?;
    self.allocate_tcp_ports(&mut spec)?;

    Ok(spec)
  }

  fn allocate_tcp_ports(
    &mut self,
    spec: &mut ServiceSpec,
  ) -> Result<(), ResolveError> {
    for port in &mut spec.ports {
      if port.protocol != Protocol::Tcp
        || port.mode != PortMode::Ingress
        || port.published_port != 0
      {
        continue;
      }
      let allocated = allocate_port(self.used_tcp_ports).ok_or(
        ResolveError::NoAvailableTcpPorts {
          container_port: port.container_port,
        },
      )?;
      self.used_tcp_ports.insert(allocated);
      port.published_port = allocated;
    }
    Ok(())
  }
}

fn apply_defaults(spec: &mut ServiceSpec) {
  if spec.namespace.is_empty() {
    spec.namespace = DEFAULT_NAMESPACE.to_string();
  }
  if spec.replicas == 0 {
    spec.replicas = ServiceSpec::DEFAULT_REPLICAS;
  }
  // `mode` and `pull_policy` already default correctly via `Default`, but
  // a caller may have constructed the spec by hand with neither of those
  // invariants upheld by serde; nothing further to normalize here since
  // both types have exactly one sensible default value already in place.
}

/// Step 3 (§4.2): `<image-base>-<4 alnum>` when the name is empty.
fn assign_name(spec: &mut ServiceSpec) {
  if !spec.name.is_empty() {
    return;
  }
  let base = image_base_name(&spec.container.image);
  let suffix = random_alnum_suffix(NAME_SUFFIX_LEN);
  spec.name = format!("{base}-{suffix}");
}

fn image_base_name(image: &str) -> String {
  // Strip a registry/tag/digest the way `docker run myrepo/myimage:tag`
  // callers expect `myimage` out of: take the last path segment, then
  // drop everything from the first `:` or `@` onward.
  let last_segment = image.rsplit('/').next().unwrap_or(image);
  let without_digest =
    last_segment.split('@').next().unwrap_or(last_segment);
  let without_tag =
    without_digest.split(':').next().unwrap_or(without_digest);
  let lowered = without_tag.to_lowercase();
  let sanitized: String = lowered
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
    .collect();
  let trimmed = sanitized.trim_matches('-');
  if trimmed.is_empty() {
    "service".to_string()
  } else {
    trimmed.to_string()
  }
}

fn random_alnum_suffix(len: usize) -> String {
  let mut rng = rand::rng();
  (0..len)
    .map(|_| {
      let idx = rng.random_range(0..NAME_SUFFIX_ALPHABET.len());
      NAME_SUFFIX_ALPHABET[idx] as char
    })
    .collect()
}

/// Step 4 (§4.2 "Ingress hostname expansion").
fn expand_ingress_hostnames(
  spec: &mut ServiceSpec,
  ctx: &ResolveContext,
) -> Result<(), ResolveError> {
  let Some(domain) = ctx.cluster_domain.as_deref() else {
    // No cluster domain: ports with an explicit hostname pass through
    // unchanged; ports with none are an error (§4.2 step 4, final bullet).
    for port in &spec.ports {
      if !port.protocol.is_http_family() {
        continue;
      }
      if port.hostname.as_deref().unwrap_or("").is_empty() {
        return Err(ResolveError::Validation(
          ValidationError::MissingHostname {
            container_port: port.container_port,
          },
        ));
      }
    }
    return Ok(());
  };

  let generated = cluster_hostname(&spec.name, &spec.namespace, domain);
  let mut extra_ports = Vec::new();

  for port in &mut spec.ports {
    if !port.protocol.is_http_family() {
      continue;
    }
    match port.hostname.as_deref() {
      None | Some("") => {
        port.hostname = Some(generated.clone());
      }
      Some(existing) if is_subdomain_of(existing, domain) => {
        // Already a cluster hostname (possibly the one we'd generate, or
        // a manually pinned one for another cluster service); keep as-is.
      }
      Some(_existing) => {
        // User-specified, non-cluster hostname: make the service
        // reachable by both (§4.2 step 4, second bullet).
        let mut dup = port.clone();
        dup.hostname = Some(generated.clone());
        extra_ports.push(dup);
      }
    }
  }

  spec.ports.extend(extra_ports);
  Ok(())
}

fn cluster_hostname(service: &str, namespace: &str, domain: &str) -> String {
  if namespace == DEFAULT_NAMESPACE {
    format!("{service}.{domain}")
  } else {
    format!("{service}-{namespace}.{domain}")
  }
}

fn is_subdomain_of(hostname: &str, domain: &str) -> bool {
  hostname == domain || hostname.ends_with(&format!(".{domain}"))
}

/// Step 5 (§4.2 "TCP ingress port allocation"): sample randomly up to 100
/// attempts, then fall back to a linear scan; `None` means the range is
/// exhausted.
fn allocate_port(used: &HashSet<u16>) -> Option<u16> {
  if used.len() as u32 > (TCP_INGRESS_PORT_MAX - TCP_INGRESS_PORT_MIN) as u32
  {
    return None;
  }

  let mut rng = rand::rng();
  for _ in 0..RANDOM_ALLOCATION_ATTEMPTS {
    let candidate =
      rng.random_range(TCP_INGRESS_PORT_MIN..=TCP_INGRESS_PORT_MAX);
    if !used.contains(&candidate) {
      return Some(candidate);
    }
  }

  (TCP_INGRESS_PORT_MIN..=TCP_INGRESS_PORT_MAX)
    .find(|candidate| !used.contains(candidate))
}

/// Used only by namespace-reserved checks elsewhere; re-exported so
/// callers don't need to import `entities::spec` just for this constant.
pub const RESERVED_SYSTEM_NAMESPACE: &str = SYSTEM_NAMESPACE;
