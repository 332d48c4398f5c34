use std::collections::HashMap;

use async_trait::async_trait;
use nebula_runtime::ActionRuntime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RunnerError;
use crate::kind::RunnerKind;
use crate::registry::{ActionRunner, decode_spec};

/// Spec for an action that starts another workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedWorkflowSpec {
  /// Workflow to start; empty selects the plan's default workflow.
  #[serde(default)]
  pub name: String,
  /// Plan file holding the workflow.
  #[serde(default)]
  pub plan: String,
}

/// Starts a nested workflow.
///
/// Dispatch needs a plan and an action executor, neither of which a runner
/// owns, so running this kind in-process always fails with
/// [`RunnerError::Unsupported`] after the spec is checked.
#[derive(Debug, Clone, Default)]
pub struct NestedWorkflow {
  pub spec: NestedWorkflowSpec,
}

#[async_trait]
impl ActionRunner for NestedWorkflow {
  fn kind(&self) -> RunnerKind {
    RunnerKind::Workflow
  }

  fn decode(&mut self, spec: &[u8]) -> Result<(), RunnerError> {
    self.spec = decode_spec(RunnerKind::Workflow, spec)?;
    Ok(())
  }

  async fn run(
    &self,
    _cancel: &CancellationToken,
    _resource_id: &str,
    runtime: &dyn ActionRuntime,
    _variables: &HashMap<String, String>,
  ) -> Result<(), RunnerError> {
    if self.spec.plan.is_empty() {
      return Err(RunnerError::invalid_spec(
        RunnerKind::Workflow,
        "plan is required",
      ));
    }

    runtime.span().in_scope(|| {
      debug!(workflow = %self.spec.name, plan = %self.spec.plan, "nested workflow requested")
    });

    Err(RunnerError::Unsupported {
      kind: RunnerKind::Workflow,
      message: format!(
        "start workflow '{}' from {} with `nebula run workflow`",
        self.spec.name, self.spec.plan
      ),
    })
  }
}
