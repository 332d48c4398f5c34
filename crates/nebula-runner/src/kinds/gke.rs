use std::collections::HashMap;

use async_trait::async_trait;
use nebula_runtime::ActionRuntime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::Invocation;
use crate::error::RunnerError;
use crate::kind::RunnerKind;
use crate::registry::{ActionRunner, decode_spec};

/// Spec for provisioning a GKE cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeClusterSpec {
  #[serde(rename = "projectID", default)]
  pub project_id: String,
  /// Defaults to the action's resource ID.
  #[serde(default)]
  pub cluster_name: String,
  #[serde(default)]
  pub zone: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_count: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub machine_type: Option<String>,
}

/// Creates a GKE cluster with `gcloud`.
#[derive(Debug, Clone, Default)]
pub struct GkeClusterProvisioner {
  pub spec: GkeClusterSpec,
}

impl GkeClusterProvisioner {
  pub fn invocation(
    &self,
    resource_id: &str,
    variables: &HashMap<String, String>,
  ) -> Result<Invocation, RunnerError> {
    let kind = RunnerKind::GkeClusterProvisioner;
    let spec = &self.spec;

    let cluster = if spec.cluster_name.is_empty() {
      resource_id
    } else {
      spec.cluster_name.as_str()
    };
    if cluster.is_empty() {
      return Err(RunnerError::invalid_spec(
        kind,
        "clusterName is empty and the action has no resource ID",
      ));
    }
    if spec.project_id.is_empty() {
      return Err(RunnerError::invalid_spec(kind, "projectID is required"));
    }
    if spec.zone.is_empty() {
      return Err(RunnerError::invalid_spec(kind, "zone is required"));
    }

    let mut invocation = Invocation::new("gcloud")
      .args(["container", "clusters", "create", cluster])
      .args(["--project", spec.project_id.as_str()])
      .args(["--zone", spec.zone.as_str()]);
    if let Some(count) = spec.node_count {
      invocation = invocation.args(["--num-nodes".to_string(), count.to_string()]);
    }
    if let Some(machine_type) = &spec.machine_type {
      invocation = invocation.args(["--machine-type", machine_type.as_str()]);
    }

    Ok(invocation.arg("--quiet").envs(variables))
  }
}

#[async_trait]
impl ActionRunner for GkeClusterProvisioner {
  fn kind(&self) -> RunnerKind {
    RunnerKind::GkeClusterProvisioner
  }

  fn decode(&mut self, spec: &[u8]) -> Result<(), RunnerError> {
    self.spec = decode_spec(RunnerKind::GkeClusterProvisioner, spec)?;
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
      info!(
        project_id = %self.spec.project_id,
        zone = %self.spec.zone,
        resource_id = %resource_id,
        "provisioning gke cluster"
      )
    });
    invocation.run(runtime, cancel).await
  }
}
