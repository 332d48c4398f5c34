use nebula_execution::ExecutorError;
use thiserror::Error;

/// Errors from selecting or running a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
  /// No workflow matched the requested name, or no default exists.
  #[error("workflow '{name}' not found")]
  WorkflowNotFound { name: String },

  /// The workflow lists an action the plan does not define.
  #[error("workflow '{workflow}' references undefined action '{action}'")]
  ActionNotFound { workflow: String, action: String },

  /// An action failed; the executor's error is passed through unchanged.
  #[error(transparent)]
  Execution(#[from] ExecutorError),
}

impl WorkflowError {
  /// Whether the error comes from the plan rather than from running it.
  pub fn is_resolution(&self) -> bool {
    matches!(
      self,
      Self::WorkflowNotFound { .. } | Self::ActionNotFound { .. }
    )
  }
}
