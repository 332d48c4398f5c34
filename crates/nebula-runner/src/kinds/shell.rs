use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use nebula_runtime::ActionRuntime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::Invocation;
use crate::error::RunnerError;
use crate::kind::RunnerKind;
use crate::registry::{ActionRunner, decode_spec};

const DEFAULT_SHELL: &str = "/bin/sh";

/// Spec for a shell action.
///
/// ```yaml
/// script: |
///   echo "deploying to $REGION"
/// shell: /bin/bash
/// env:
///   LOG_LEVEL: debug
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSpec {
  /// Image the script expects to run in; informational in-process.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  #[serde(default)]
  pub script: String,
  /// Interpreter, invoked as `<shell> -c <script>`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
  /// Extra environment, applied over the workflow variables.
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

/// Runs a script with a local shell.
#[derive(Debug, Clone, Default)]
pub struct Shell {
  pub spec: ShellSpec,
}

impl Shell {
  pub fn invocation(&self, variables: &HashMap<String, String>) -> Result<Invocation, RunnerError> {
    if self.spec.script.trim().is_empty() {
      return Err(RunnerError::invalid_spec(
        RunnerKind::Shell,
        "script must not be empty",
      ));
    }

    let shell = self.spec.shell.as_deref().unwrap_or(DEFAULT_SHELL);
    Ok(
      Invocation::new(shell)
        .args(["-c", self.spec.script.as_str()])
        .envs(variables)
        .envs(&self.spec.env),
    )
  }
}

#[async_trait]
impl ActionRunner for Shell {
  fn kind(&self) -> RunnerKind {
    RunnerKind::Shell
  }

  fn decode(&mut self, spec: &[u8]) -> Result<(), RunnerError> {
    self.spec = decode_spec(RunnerKind::Shell, spec)?;
    Ok(())
  }

  async fn run(
    &self,
    cancel: &CancellationToken,
    _resource_id: &str,
    runtime: &dyn ActionRuntime,
    variables: &HashMap<String, String>,
  ) -> Result<(), RunnerError> {
    let invocation = self.invocation(variables)?;
    runtime.span().in_scope(|| info!(shell = %invocation.program, "running shell script"));
    invocation.run(runtime, cancel).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_spec_env_overrides_variables() {
    let mut shell = Shell::default();
    shell
      .decode(b"script: echo $A\nenv:\n  A: from-spec\n")
      .unwrap();

    let variables = HashMap::from([
      ("A".to_string(), "from-workflow".to_string()),
      ("B".to_string(), "kept".to_string()),
    ]);
    let invocation = shell.invocation(&variables).unwrap();

    assert_eq!(invocation.program, DEFAULT_SHELL);
    assert_eq!(invocation.args, vec!["-c", "echo $A"]);
    assert_eq!(invocation.env["A"], "from-spec");
    assert_eq!(invocation.env["B"], "kept");
  }

  #[test]
  fn test_empty_script_is_invalid() {
    let shell = Shell::default();
    let err = shell.invocation(&HashMap::new()).unwrap_err();
    assert!(matches!(err, RunnerError::InvalidSpec { kind: RunnerKind::Shell, .. }));
  }
}
