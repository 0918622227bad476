//! Input validation, trimmed from the teacher's `lib/validations` crate:
//! same `StringValidator` builder shape, minus the `bson::oid::ObjectId`
//! matcher (this crate has no database layer to validate IDs against).

use std::sync::OnceLock;

use regex::Regex;

use crate::entities::spec::ServiceSpec;

/// `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, ≤63 chars (§3 "Invariants", §6
/// "Namespaces").
fn dns_label_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
  })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("'{field}' must be a valid DNS label (lowercase alphanumeric and hyphens, <=63 chars, alphanumeric ends): got {value:?}")]
  InvalidDnsLabel { field: &'static str, value: String },
  #[error("container image must not be empty")]
  EmptyImage,
  #[error("volume mount references undeclared volume {0:?}")]
  UndeclaredVolume(String),
  #[error("port {container_port} has empty hostname and no cluster domain is configured")]
  MissingHostname { container_port: u16 },
}

/// Options to validate a single string, mirroring the teacher's
/// `StringValidator` builder.
#[derive(Default)]
pub struct StringValidator {
  pub min_length: usize,
  pub max_length: Option<usize>,
  pub dns_label: bool,
}

impl StringValidator {
  pub fn min_length(mut self, min_length: usize) -> Self {
    self.min_length = min_length;
    self
  }

  pub fn max_length(mut self, max_length: usize) -> Self {
    self.max_length = Some(max_length);
    self
  }

  pub fn dns_label(mut self) -> Self {
    self.dns_label = true;
    self
  }

  pub fn validate(
    &self,
    field: &'static str,
    input: &str,
  ) -> Result<(), ValidationError> {
    if input.len() < self.min_length
      || self.max_length.is_some_and(|max| input.len() > max)
      || (self.dns_label && !dns_label_re().is_match(input))
    {
      return Err(ValidationError::InvalidDnsLabel {
        field,
        value: input.to_string(),
      });
    }
    Ok(())
  }
}

fn dns_label_validator() -> StringValidator {
  StringValidator::default().max_length(63).dns_label()
}

pub fn is_valid_dns_label(s: &str) -> bool {
  dns_label_validator().validate("label", s).is_ok()
}

/// Structural validation run as step 1 of `resolve` (§4.2). Doesn't touch
/// cluster state; only checks the spec is internally consistent.
pub fn validate_structure(
  spec: &ServiceSpec,
) -> Result<(), ValidationError> {
  if spec.container.image.trim().is_empty() {
    return Err(ValidationError::EmptyImage);
  }

  if !spec.namespace.is_empty() {
    dns_label_validator().validate("namespace", &spec.namespace)?;
  }

  if !spec.name.is_empty() {
    dns_label_validator().validate("name", &spec.name)?;
  }

  let declared: std::collections::HashSet<&str> =
    spec.volumes.iter().map(|v| v.name.as_str()).collect();
  for mount in &spec.container.volume_mounts {
    if !declared.contains(mount.volume_name.as_str()) {
      return Err(ValidationError::UndeclaredVolume(
        mount.volume_name.clone(),
      ));
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_valid_labels() {
    assert!(is_valid_dns_label("default"));
    assert!(is_valid_dns_label("web-01"));
    assert!(is_valid_dns_label("a"));
  }

  #[test]
  fn rejects_invalid_labels() {
    assert!(!is_valid_dns_label(""));
    assert!(!is_valid_dns_label("-leading"));
    assert!(!is_valid_dns_label("trailing-"));
    assert!(!is_valid_dns_label("Has_Upper"));
    assert!(!is_valid_dns_label(&"a".repeat(64)));
  }
}
