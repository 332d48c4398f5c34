//! Executor errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::encoding::EncodeError;
use crate::engine::DockerError;

/// A supervised step of a container run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Pull,
  Start,
  Wait,
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Step::Pull => "image pull",
      Step::Start => "container start",
      Step::Wait => "container wait",
    })
  }
}

/// Errors that can occur while scheduling an action.
///
/// Nothing here is retried; every error reaches the caller with its cause
/// attached.
#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("failed to pull image '{image}': {source}")]
  ImagePull {
    image: String,
    #[source]
    source: DockerError,
  },

  #[error("failed to encode spec of action '{action}': {source}")]
  Encode {
    action: String,
    #[source]
    source: EncodeError,
  },

  #[error("failed to create runner context directory: {source}")]
  RunnerContext {
    #[source]
    source: std::io::Error,
  },

  #[error("failed to determine build directory: {source}")]
  WorkingDirectory {
    #[source]
    source: std::io::Error,
  },

  #[error("failed to create container '{name}': {source}")]
  ContainerCreate {
    name: String,
    #[source]
    source: DockerError,
  },

  #[error("failed to start container '{name}': {source}")]
  ContainerStart {
    name: String,
    #[source]
    source: DockerError,
  },

  #[error("failed to stream logs of container '{name}': {source}")]
  ContainerLogs {
    name: String,
    #[source]
    source: DockerError,
  },

  /// The container exited non-zero, or its wait failed.
  #[error("container '{name}' {}", execution_detail(.exit_code, .source))]
  ContainerExecution {
    name: String,
    exit_code: Option<i64>,
    #[source]
    source: Option<DockerError>,
  },

  #[error("action cancelled")]
  Cancelled,

  #[error("{step} timed out after {after:?}")]
  Timeout { step: Step, after: Duration },
}

impl ExecutorError {
  /// Exit code of a container that ran and failed.
  pub fn exit_code(&self) -> Option<i64> {
    match self {
      Self::ContainerExecution { exit_code, .. } => *exit_code,
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

fn execution_detail(exit_code: &Option<i64>, source: &Option<DockerError>) -> String {
  match (exit_code, source) {
    (Some(code), _) => format!("exited with code {}", code),
    (None, Some(e)) => format!("failed while waiting for exit: {}", e),
    (None, None) => "failed".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_execution_error_display() {
    let err = ExecutorError::ContainerExecution {
      name: "nebula-action-a-1".to_string(),
      exit_code: Some(2),
      source: None,
    };
    assert_eq!(err.to_string(), "container 'nebula-action-a-1' exited with code 2");
    assert_eq!(err.exit_code(), Some(2));

    let err = ExecutorError::ContainerExecution {
      name: "c".to_string(),
      exit_code: None,
      source: Some(DockerError::WaitAborted),
    };
    assert_eq!(
      err.to_string(),
      "container 'c' failed while waiting for exit: container wait ended without a result"
    );
    assert!(std::error::Error::source(&err).is_some());
  }

  #[test]
  fn test_timeout_display() {
    let err = ExecutorError::Timeout {
      step: Step::Pull,
      after: Duration::from_secs(5),
    };
    assert_eq!(err.to_string(), "image pull timed out after 5s");
  }
}
