use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use nebula_runtime::ActionRuntime;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::Invocation;
use crate::error::RunnerError;
use crate::kind::RunnerKind;
use crate::registry::{ActionRunner, decode_spec};

/// Spec for installing or upgrading a helm release.
///
/// ```yaml
/// chart: bitnami/nginx
/// release: web
/// namespace: frontend
/// values:
///   replicaCount: 2
///   service:
///     type: LoadBalancer
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartSpec {
  #[serde(default)]
  pub chart: String,
  /// Defaults to the action's resource ID.
  #[serde(default)]
  pub release: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repository: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default)]
  pub values: BTreeMap<String, Value>,
}

/// Deploys a chart with `helm upgrade --install`.
#[derive(Debug, Clone, Default)]
pub struct HelmChartDeployment {
  pub spec: HelmChartSpec,
}

impl HelmChartDeployment {
  pub fn invocation(
    &self,
    resource_id: &str,
    variables: &HashMap<String, String>,
  ) -> Result<Invocation, RunnerError> {
    let kind = RunnerKind::HelmChartDeployment;
    let spec = &self.spec;

    if spec.chart.is_empty() {
      return Err(RunnerError::invalid_spec(kind, "chart is required"));
    }
    let release = if spec.release.is_empty() {
      resource_id
    } else {
      spec.release.as_str()
    };
    if release.is_empty() {
      return Err(RunnerError::invalid_spec(
        kind,
        "release is empty and the action has no resource ID",
      ));
    }

    let mut invocation =
      Invocation::new("helm").args(["upgrade", release, spec.chart.as_str(), "--install"]);
    if let Some(namespace) = &spec.namespace {
      invocation = invocation.args(["--namespace", namespace.as_str(), "--create-namespace"]);
    }
    if let Some(repository) = &spec.repository {
      invocation = invocation.args(["--repo", repository.as_str()]);
    }
    if let Some(version) = &spec.version {
      invocation = invocation.args(["--version", version.as_str()]);
    }

    let mut sets = Vec::new();
    for (key, value) in &spec.values {
      flatten_value(key, value, &mut sets);
    }
    for set in sets {
      invocation = invocation.arg("--set").arg(set);
    }

    Ok(invocation.arg("--wait").envs(variables))
  }
}

/// Flatten a values tree into helm `--set` assignments.
///
/// Mappings become dotted paths and sequences indexed paths, so
/// `{service: {ports: [80]}}` yields `service.ports[0]=80`.
fn flatten_value(path: &str, value: &Value, out: &mut Vec<String>) {
  match value {
    Value::Mapping(map) => {
      for (key, child) in map {
        if let Some(key) = scalar_to_string(key) {
          flatten_value(&format!("{}.{}", path, key), child, out);
        }
      }
    }
    Value::Sequence(items) => {
      for (index, child) in items.iter().enumerate() {
        flatten_value(&format!("{}[{}]", path, index), child, out);
      }
    }
    Value::Tagged(tagged) => flatten_value(path, &tagged.value, out),
    scalar => {
      let rendered = scalar_to_string(scalar).unwrap_or_default();
      out.push(format!("{}={}", path, rendered));
    }
  }
}

fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::Null => Some("null".to_string()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::String(s) => Some(s.clone()),
    _ => None,
  }
}

#[async_trait]
impl ActionRunner for HelmChartDeployment {
  fn kind(&self) -> RunnerKind {
    RunnerKind::HelmChartDeployment
  }

  fn decode(&mut self, spec: &[u8]) -> Result<(), RunnerError> {
    self.spec = decode_spec(RunnerKind::HelmChartDeployment, spec)?;
    Ok(())
  }

  async fn run(
    &self,
    cancel: &CancellationToken,
    resource_id: &str,
    runtime: &dyn ActionRuntime,
    variables: &HashMap<String, String>,
  ) -> Result<(), RunnerError> {
    let invocation = self.invocation(resource_id, variables)?;
    runtime.span().in_scope(|| {
      info!(chart = %self.spec.chart, resource_id = %resource_id, "deploying helm chart")
    });
    invocation.run(runtime, cancel).await
  }
}
