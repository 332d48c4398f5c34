use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the docker daemon socket, mirrored into containers.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Credentials for pulling action images from a private registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
  pub host: String,
  pub username: String,
  pub password: String,
}

impl fmt::Debug for RegistryAuth {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RegistryAuth")
      .field("host", &self.host)
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}

/// Configuration for the docker action executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Host socket path, bind-mounted at the same path inside the container.
  pub docker_socket: PathBuf,
  /// Registry credentials; anonymous pulls when absent.
  pub registry: Option<RegistryAuth>,
  /// Upper bound on an image pull. None waits indefinitely.
  pub pull_timeout: Option<Duration>,
  /// Upper bound on starting the container.
  pub start_timeout: Option<Duration>,
  /// Upper bound on the container running to completion, logs included.
  pub wait_timeout: Option<Duration>,
  /// Leave the per-run runner context directory on disk after the action.
  pub keep_runner_context: bool,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
      registry: None,
      pull_timeout: None,
      start_timeout: None,
      wait_timeout: None,
      keep_runner_context: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_debug_redacts_password() {
    let auth = RegistryAuth {
      host: "gcr.io".to_string(),
      username: "_json_key".to_string(),
      password: "hunter2".to_string(),
    };
    let rendered = format!("{:?}", auth);
    assert!(rendered.contains("gcr.io"));
    assert!(!rendered.contains("hunter2"));
  }
}
