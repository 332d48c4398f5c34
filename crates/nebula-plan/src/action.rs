use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// A single named unit of work bound to a container image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  /// Unique within a plan; workflows reference actions by this name.
  pub name: String,

  /// Container image reference, e.g. "projectnebula/helm-deploy:latest".
  #[serde(default)]
  pub image: String,

  /// Opaque handle to externally managed infrastructure state.
  #[serde(rename = "resourceID", default)]
  pub resource_id: String,

  /// Runner kind the action's entrypoint dispatches to, e.g. "shell".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,

  /// Action specific configuration, opaque to the core.
  #[serde(default)]
  pub spec: ActionSpec,
}

/// An action's configuration document.
///
/// The YAML value is parsed once with the rest of the plan and carried
/// structurally, so arbitrary nesting survives without a fixed schema.
/// Runners decode it into their own typed spec via [`ActionSpec::to_yaml`];
/// the executor encodes it to JSON for the container environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSpec(serde_yaml::Value);

impl ActionSpec {
  /// Wrap an already parsed YAML value.
  pub fn new(value: serde_yaml::Value) -> Self {
    Self(value)
  }

  /// Parse a spec from a YAML fragment.
  pub fn from_yaml(source: &str) -> Result<Self, PlanError> {
    serde_yaml::from_str(source).map_err(|e| PlanError::Loader { source: e })
  }

  /// The underlying document value.
  pub fn value(&self) -> &serde_yaml::Value {
    &self.0
  }

  /// True when the action declared no spec at all.
  pub fn is_empty(&self) -> bool {
    self.0.is_null()
  }

  /// Render the spec as a YAML fragment for runner decoding.
  pub fn to_yaml(&self) -> Result<Vec<u8>, PlanError> {
    serde_yaml::to_string(&self.0)
      .map(String::into_bytes)
      .map_err(|e| PlanError::SpecSerialization { source: e })
  }
}

impl From<serde_yaml::Value> for ActionSpec {
  fn from(value: serde_yaml::Value) -> Self {
    Self(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_spec_keeps_nested_structure() {
    let action: Action = serde_yaml::from_str(
      r#"
name: deploy
image: helm:latest
resourceID: cluster-a
spec:
  chart: nginx
  values:
    replicas: 3
    ports: [80, 443]
"#,
    )
    .unwrap();

    assert_eq!(action.resource_id, "cluster-a");
    let spec = action.spec.value();
    assert_eq!(spec["chart"], "nginx");
    assert_eq!(spec["values"]["replicas"], 3);
    assert_eq!(spec["values"]["ports"][1], 443);
  }

  #[test]
  fn test_missing_spec_is_empty() {
    let action: Action = serde_yaml::from_str("name: noop\nimage: busybox").unwrap();
    assert!(action.spec.is_empty());
    assert!(action.kind.is_none());
  }

  #[test]
  fn test_to_yaml_reparses_to_same_value() {
    let spec = ActionSpec::from_yaml("script: echo hi\nshell: /bin/bash\n").unwrap();
    let bytes = spec.to_yaml().unwrap();
    let reparsed: serde_yaml::Value = serde_yaml::from_slice(&bytes).unwrap();
    assert_eq!(&reparsed, spec.value());
  }
}
