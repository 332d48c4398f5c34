//! Runner errors.

use thiserror::Error;

use crate::kind::RunnerKind;

/// Errors that can occur while constructing, decoding or running a runner.
#[derive(Debug, Error)]
pub enum RunnerError {
  /// No runner exists for the requested kind.
  #[error("runner not found for kind '{kind}'")]
  RunnerNotFound { kind: String },

  /// The spec fragment does not match the runner's schema.
  #[error("failed to decode {kind} spec: {source}")]
  Decode {
    kind: RunnerKind,
    #[source]
    source: serde_yaml::Error,
  },

  /// The spec decoded but is missing something the runner needs.
  #[error("invalid {kind} spec: {message}")]
  InvalidSpec { kind: RunnerKind, message: String },

  /// An external command could not be started.
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// An external command exited unsuccessfully.
  #[error("'{program}' exited with {}", describe_exit(.exit_code))]
  CommandFailed {
    program: String,
    exit_code: Option<i32>,
  },

  /// Forwarding command output to the runtime failed.
  #[error("failed to stream command output: {source}")]
  Output {
    #[source]
    source: std::io::Error,
  },

  /// The run was cancelled.
  #[error("runner cancelled")]
  Cancelled,

  /// The runner kind cannot execute in this process.
  #[error("{kind} runner cannot execute here: {message}")]
  Unsupported { kind: RunnerKind, message: String },
}

impl RunnerError {
  /// True for errors that indicate a bug rather than bad input or a
  /// failing environment. These are never worth retrying.
  pub fn is_bug(&self) -> bool {
    matches!(self, Self::Decode { .. })
  }

  pub(crate) fn invalid_spec(kind: RunnerKind, message: impl Into<String>) -> Self {
    Self::InvalidSpec {
      kind,
      message: message.into(),
    }
  }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
  exit_code.map_or("a signal".to_string(), |c| format!("code {}", c))
}
