//! The runner trait and the kind-keyed registry.

use std::collections::HashMap;

use async_trait::async_trait;
use nebula_runtime::ActionRuntime;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::kind::RunnerKind;
use crate::kinds::{GkeClusterProvisioner, HelmChartDeployment, NestedWorkflow, Shell};

/// A handler for one kind of action.
///
/// Runners are created zero-valued by [`new_runner`], filled from the
/// action's spec via [`ActionRunner::decode`], then run. A single `run`
/// call is atomic from the caller's point of view.
#[async_trait]
pub trait ActionRunner: Send + Sync {
  /// The kind this runner handles.
  fn kind(&self) -> RunnerKind;

  /// Decode a YAML spec fragment into the runner's typed spec.
  ///
  /// An empty or null document leaves the spec at its defaults.
  fn decode(&mut self, spec: &[u8]) -> Result<(), RunnerError>;

  /// Execute the action.
  ///
  /// `resource_id` is the action's opaque infrastructure handle and
  /// `variables` the workflow environment.
  async fn run(
    &self,
    cancel: &CancellationToken,
    resource_id: &str,
    runtime: &dyn ActionRuntime,
    variables: &HashMap<String, String>,
  ) -> Result<(), RunnerError>;
}

/// Construct a zero-valued runner for `kind`.
pub fn new_runner(kind: &str) -> Result<Box<dyn ActionRunner>, RunnerError> {
  let kind: RunnerKind = kind.parse()?;
  let runner: Box<dyn ActionRunner> = match kind {
    RunnerKind::Shell => Box::new(Shell::default()),
    RunnerKind::GkeClusterProvisioner => Box::new(GkeClusterProvisioner::default()),
    RunnerKind::Workflow => Box::new(NestedWorkflow::default()),
    RunnerKind::HelmChartDeployment => Box::new(HelmChartDeployment::default()),
  };
  Ok(runner)
}

/// Construct the runner for `kind` and decode `spec` into it.
pub fn decode_runner(kind: &str, spec: &[u8]) -> Result<Box<dyn ActionRunner>, RunnerError> {
  let mut runner = new_runner(kind)?;
  runner.decode(spec)?;
  Ok(runner)
}

pub(crate) fn decode_spec<T>(kind: RunnerKind, spec: &[u8]) -> Result<T, RunnerError>
where
  T: DeserializeOwned + Default,
{
  if spec.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  let value: serde_yaml::Value =
    serde_yaml::from_slice(spec).map_err(|e| RunnerError::Decode { kind, source: e })?;
  if value.is_null() {
    return Ok(T::default());
  }
  serde_yaml::from_value(value).map_err(|e| RunnerError::Decode { kind, source: e })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_runner_dispatches_on_kind() {
    for (name, kind) in [
      ("shell", RunnerKind::Shell),
      ("gke-cluster-provisioner", RunnerKind::GkeClusterProvisioner),
      ("workflow", RunnerKind::Workflow),
      ("helm-chart-deployment", RunnerKind::HelmChartDeployment),
      ("helm-deploy", RunnerKind::HelmChartDeployment),
    ] {
      let runner = new_runner(name).unwrap();
      assert_eq!(runner.kind(), kind, "kind for {}", name);
    }
  }

  #[test]
  fn test_unknown_kind_is_not_found() {
    let err = new_runner("nonexistent-kind").err().unwrap();
    assert!(matches!(err, RunnerError::RunnerNotFound { kind } if kind == "nonexistent-kind"));
  }

  #[test]
  fn test_decode_runner_reports_schema_mismatch() {
    let err = decode_runner("shell", b"script: [not, a, string]").err().unwrap();
    assert!(matches!(
      err,
      RunnerError::Decode {
        kind: RunnerKind::Shell,
        ..
      }
    ));
    assert!(err.is_bug());
  }

  #[test]
  fn test_empty_spec_decodes_to_defaults() {
    assert!(decode_runner("helm-deploy", b"").is_ok());
    assert!(decode_runner("workflow", b"null\n").is_ok());
  }
}
