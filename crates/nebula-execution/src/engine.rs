//! The container engine seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nebula_runtime::RuntimeIo;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::RegistryAuth;

/// Errors reported by a container engine.
#[derive(Debug, Error)]
pub enum DockerError {
  /// The engine's client could not be invoked.
  #[error("failed to run docker {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The engine rejected a request.
  #[error("docker {command} failed{}: {stderr}", exit_suffix(.exit_code))]
  Command {
    command: String,
    exit_code: Option<i32>,
    stderr: String,
  },

  /// The engine answered with something unexpected.
  #[error("unexpected output from docker {command}: {output:?}")]
  UnexpectedOutput { command: String, output: String },

  /// The wait for a container ended without a status or an error.
  #[error("container wait ended without a result")]
  WaitAborted,

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
  exit_code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

/// A host path bind-mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
  pub host: PathBuf,
  pub container: String,
}

impl Bind {
  pub fn new(host: impl AsRef<Path>, container: impl Into<String>) -> Self {
    Self {
      host: host.as_ref().to_path_buf(),
      container: container.into(),
    }
  }

  /// `host:container`, as the docker CLI and API expect.
  pub fn spec(&self) -> String {
    format!("{}:{}", self.host.display(), self.container)
  }
}

/// Everything needed to create one action container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerConfig {
  pub image: String,
  /// `KEY=VALUE` entries, sorted by key.
  pub env: Vec<String>,
  pub binds: Vec<Bind>,
  pub privileged: bool,
  /// Remove the container once it exits.
  pub auto_remove: bool,
  /// Network to attach to; None keeps the engine default.
  pub network: Option<String>,
}

impl ContainerConfig {
  /// Value of an environment entry, if set.
  pub fn env_var(&self, key: &str) -> Option<&str> {
    self.env.iter().find_map(|entry| {
      entry
        .split_once('=')
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v)
    })
  }
}

/// Final state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
  pub exit_code: i64,
}

/// A registered wait on a container.
///
/// Exactly one of the two channels is expected to resolve: `status` when
/// the container stops, `error` when the engine loses track of it.
pub struct ContainerWait {
  pub status: oneshot::Receiver<WaitStatus>,
  pub error: oneshot::Receiver<DockerError>,
}

impl ContainerWait {
  /// A wait plus the senders an engine resolves it with.
  pub fn channel() -> (
    oneshot::Sender<WaitStatus>,
    oneshot::Sender<DockerError>,
    ContainerWait,
  ) {
    let (status_tx, status) = oneshot::channel();
    let (error_tx, error) = oneshot::channel();
    (status_tx, error_tx, ContainerWait { status, error })
  }
}

/// Client for a container daemon.
///
/// The executor drives calls in this order: `pull_image`,
/// `create_container`, `wait_container`, `start_container`, `stream_logs`.
/// The wait is registered before start so an auto-removed container still
/// reports its exit status.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
  /// Fetch `image`, writing progress to the runtime's output stream.
  async fn pull_image(
    &self,
    image: &str,
    auth: Option<&RegistryAuth>,
    io: &RuntimeIo,
  ) -> Result<(), DockerError>;

  /// Create a container and return its ID.
  async fn create_container(&self, name: &str, config: &ContainerConfig)
  -> Result<String, DockerError>;

  /// Register a wait for the container to stop running.
  async fn wait_container(&self, id: &str) -> Result<ContainerWait, DockerError>;

  async fn start_container(&self, id: &str) -> Result<(), DockerError>;

  /// Follow the container's stdout and stderr into the runtime's streams
  /// until both close.
  async fn stream_logs(&self, id: &str, io: &RuntimeIo) -> Result<(), DockerError>;

  /// Force-remove a container that will not be run to completion.
  async fn remove_container(&self, id: &str) -> Result<(), DockerError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_env_var_lookup() {
    let config = ContainerConfig {
      env: vec!["A=1".to_string(), "B=x=y".to_string()],
      ..Default::default()
    };
    assert_eq!(config.env_var("A"), Some("1"));
    assert_eq!(config.env_var("B"), Some("x=y"));
    assert_eq!(config.env_var("C"), None);
  }

  #[test]
  fn test_command_error_display() {
    let err = DockerError::Command {
      command: "start".to_string(),
      exit_code: Some(1),
      stderr: "Error response from daemon".to_string(),
    };
    assert_eq!(err.to_string(), "docker start failed with code 1: Error response from daemon");

    let err = DockerError::Command {
      command: "pull".to_string(),
      exit_code: None,
      stderr: "killed".to_string(),
    };
    assert_eq!(err.to_string(), "docker pull failed: killed");
  }

  #[test]
  fn test_bind_spec() {
    let bind = Bind::new("/tmp/ctx", "/nebula-runner-context");
    assert_eq!(bind.spec(), "/tmp/ctx:/nebula-runner-context");
  }
}
