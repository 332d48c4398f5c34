use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nebula_plan::Action;
use nebula_runtime::ActionRuntime;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::docker_cli::DockerCli;
use crate::encoding::{ACTION_SPEC_ENV, Base64Encoder, encode_action_spec};
use crate::engine::{Bind, ContainerConfig, ContainerEngine, ContainerWait, DockerError};
use crate::error::{ExecutorError, Step};

/// Prefix of the per-run host directory shared with the container.
pub const RUNNER_CONTEXT_PREFIX: &str = "nebula-runner-context-";
/// Where the runner context directory is mounted inside the container.
pub const RUNNER_CONTEXT_MOUNT: &str = "/nebula-runner-context";
/// Where the host working directory is mounted inside the container.
pub const BUILD_MOUNT: &str = "/build";

/// Runs a single action to completion.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
  /// Run `action` with `env` exported to it. Returns once the action has
  /// finished; Ok means it succeeded.
  async fn schedule_action(
    &self,
    cancel: &CancellationToken,
    runtime: &dyn ActionRuntime,
    action: &Action,
    env: &HashMap<String, String>,
  ) -> Result<(), ExecutorError>;
}

/// Executes actions as privileged, auto-removed containers.
pub struct DockerExecutor {
  engine: Arc<dyn ContainerEngine>,
  config: ExecutorConfig,
}

impl DockerExecutor {
  pub fn new(engine: Arc<dyn ContainerEngine>, config: ExecutorConfig) -> Self {
    Self { engine, config }
  }

  /// An executor driving the local `docker` CLI.
  pub fn docker(config: ExecutorConfig) -> Self {
    Self::new(Arc::new(DockerCli::new()), config)
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  /// A fresh, unique container name for one run of `action`.
  pub fn container_name(action: &Action) -> String {
    let name: String = action
      .name
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
          c
        } else {
          '-'
        }
      })
      .collect();
    format!("nebula-action-{}-{}", name, Uuid::new_v4())
  }

  /// Container settings for one run of `action`.
  ///
  /// `env` is exported sorted by key, with the encoded spec added under
  /// [`ACTION_SPEC_ENV`]. The docker socket, the runner context and the
  /// build directory are bind-mounted.
  pub fn container_config(
    &self,
    action: &Action,
    env: &HashMap<String, String>,
    runner_context: &Path,
    build_dir: &Path,
  ) -> Result<ContainerConfig, ExecutorError> {
    let spec = encode_action_spec(action, Some(&Base64Encoder)).map_err(|e| {
      ExecutorError::Encode {
        action: action.name.clone(),
        source: e,
      }
    })?;

    let mut vars: BTreeMap<&str, &str> = env
      .iter()
      .map(|(k, v)| (k.as_str(), v.as_str()))
      .collect();
    vars.insert(ACTION_SPEC_ENV, &spec);

    let socket = &self.config.docker_socket;
    Ok(ContainerConfig {
      image: action.image.clone(),
      env: vars
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect(),
      binds: vec![
        Bind::new(socket, socket.display().to_string()),
        Bind::new(runner_context, RUNNER_CONTEXT_MOUNT),
        Bind::new(build_dir, BUILD_MOUNT),
      ],
      privileged: true,
      auto_remove: true,
      network: None,
    })
  }

  #[instrument(
    name = "schedule_action",
    parent = runtime.span(),
    skip(self, cancel, runtime, action, env),
    fields(action = %action.name, image = %action.image)
  )]
  async fn schedule(
    &self,
    cancel: &CancellationToken,
    runtime: &dyn ActionRuntime,
    action: &Action,
    env: &HashMap<String, String>,
  ) -> Result<(), ExecutorError> {
    if cancel.is_cancelled() {
      return Err(ExecutorError::Cancelled);
    }
    info!("action_scheduled");

    let pull = self
      .engine
      .pull_image(&action.image, self.config.registry.as_ref(), runtime.io());
    supervise(cancel, Step::Pull, self.config.pull_timeout, pull)
      .await?
      .map_err(|e| ExecutorError::ImagePull {
        image: action.image.clone(),
        source: e,
      })?;

    let runner_context = tempfile::Builder::new()
      .prefix(RUNNER_CONTEXT_PREFIX)
      .tempdir()
      .map_err(|e| ExecutorError::RunnerContext { source: e })?;

    let result = self
      .run_in_context(cancel, runtime, action, env, runner_context.path())
      .await;
    self.release_runner_context(runner_context);

    match &result {
      Ok(()) => info!("action_completed"),
      Err(e) => error!(error = %e, "action_failed"),
    }
    result
  }

  async fn run_in_context(
    &self,
    cancel: &CancellationToken,
    runtime: &dyn ActionRuntime,
    action: &Action,
    env: &HashMap<String, String>,
    runner_context: &Path,
  ) -> Result<(), ExecutorError> {
    let build_dir =
      std::env::current_dir().map_err(|e| ExecutorError::WorkingDirectory { source: e })?;
    let config = self.container_config(action, env, runner_context, &build_dir)?;
    let name = Self::container_name(action);

    let id = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
      created = self.engine.create_container(&name, &config) => {
        created.map_err(|e| ExecutorError::ContainerCreate { name: name.clone(), source: e })?
      }
    };
    info!(container = %name, id = %id, "container_created");

    // Registered before start so a fast, auto-removed container cannot
    // exit unobserved.
    let wait = match self.engine.wait_container(&id).await {
      Ok(wait) => wait,
      Err(e) => {
        self.discard(&id).await;
        return Err(execution_failed(&name, e));
      }
    };

    let start = self.engine.start_container(&id);
    match supervise(cancel, Step::Start, self.config.start_timeout, start).await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        self.discard(&id).await;
        return Err(ExecutorError::ContainerStart { name, source: e });
      }
      Err(e) => {
        self.discard(&id).await;
        return Err(e);
      }
    }
    info!(container = %name, "container_started");

    let finish = async {
      if let Err(e) = self.engine.stream_logs(&id, runtime.io()).await {
        return Err(ExecutorError::ContainerLogs {
          name: name.clone(),
          source: e,
        });
      }
      await_exit(&name, wait).await
    };
    match supervise(cancel, Step::Wait, self.config.wait_timeout, finish).await {
      Ok(result) => result,
      Err(e) => {
        self.discard(&id).await;
        Err(e)
      }
    }
  }

  async fn discard(&self, id: &str) {
    if let Err(e) = self.engine.remove_container(id).await {
      warn!(id, error = %e, "failed to remove container");
    }
  }

  fn release_runner_context(&self, dir: TempDir) {
    if self.config.keep_runner_context {
      let path = dir.keep();
      info!(path = %path.display(), "keeping runner context");
      return;
    }
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
      warn!(path = %path.display(), error = %e, "failed to remove runner context");
    }
  }
}

#[async_trait]
impl ActionExecutor for DockerExecutor {
  async fn schedule_action(
    &self,
    cancel: &CancellationToken,
    runtime: &dyn ActionRuntime,
    action: &Action,
    env: &HashMap<String, String>,
  ) -> Result<(), ExecutorError> {
    self.schedule(cancel, runtime, action, env).await
  }
}

/// Run `step` unless `cancel` fires or `limit` elapses first.
async fn supervise<F: Future>(
  cancel: &CancellationToken,
  step: Step,
  limit: Option<Duration>,
  fut: F,
) -> Result<F::Output, ExecutorError> {
  let bounded = async {
    match limit {
      Some(after) => tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ExecutorError::Timeout { step, after }),
      None => Ok(fut.await),
    }
  };
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(ExecutorError::Cancelled),
    result = bounded => result,
  }
}

/// Resolve a registered wait. An error report wins over a status that
/// arrives at the same time.
async fn await_exit(name: &str, wait: ContainerWait) -> Result<(), ExecutorError> {
  let ContainerWait {
    mut status,
    mut error,
  } = wait;
  tokio::select! {
    biased;
    Ok(e) = &mut error => Err(execution_failed(name, e)),
    Ok(exited) = &mut status => {
      if exited.exit_code == 0 {
        Ok(())
      } else {
        Err(ExecutorError::ContainerExecution {
          name: name.to_string(),
          exit_code: Some(exited.exit_code),
          source: None,
        })
      }
    }
    else => Err(execution_failed(name, DockerError::WaitAborted)),
  }
}

fn execution_failed(name: &str, source: DockerError) -> ExecutorError {
  ExecutorError::ContainerExecution {
    name: name.to_string(),
    exit_code: None,
    source: Some(source),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encoding::decode_action_spec;
  use nebula_plan::ActionSpec;

  fn action(name: &str) -> Action {
    Action {
      name: name.to_string(),
      image: "ghcr.io/nebula/shell:1".to_string(),
      resource_id: String::new(),
      kind: None,
      spec: ActionSpec::from_yaml("script: make\n").unwrap(),
    }
  }

  #[test]
  fn test_container_name_is_unique_and_valid() {
    let a = DockerExecutor::container_name(&action("build app"));
    let b = DockerExecutor::container_name(&action("build app"));
    assert!(a.starts_with("nebula-action-build-app-"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_container_config() {
    let executor = DockerExecutor::docker(ExecutorConfig::default());
    let env = HashMap::from([
      ("NEBULA_WORKFLOW".to_string(), "deploy".to_string()),
      ("A".to_string(), "1".to_string()),
    ]);
    let config = executor
      .container_config(
        &action("build"),
        &env,
        Path::new("/tmp/nebula-runner-context-x"),
        Path::new("/src"),
      )
      .unwrap();

    assert_eq!(config.image, "ghcr.io/nebula/shell:1");
    assert!(config.privileged);
    assert!(config.auto_remove);
    assert_eq!(config.network, None);

    let keys: Vec<&str> = config
      .env
      .iter()
      .filter_map(|e| e.split_once('=').map(|(k, _)| k))
      .collect();
    assert_eq!(keys, vec!["A", "NEBULA_ACTION_SPEC", "NEBULA_WORKFLOW"]);

    let spec = decode_action_spec(config.env_var(ACTION_SPEC_ENV).unwrap()).unwrap();
    assert_eq!(spec, serde_json::json!({ "script": "make" }));

    let binds: Vec<String> = config.binds.iter().map(Bind::spec).collect();
    assert_eq!(
      binds,
      vec![
        "/var/run/docker.sock:/var/run/docker.sock",
        "/tmp/nebula-runner-context-x:/nebula-runner-context",
        "/src:/build",
      ]
    );
  }

  #[test]
  fn test_encoded_spec_overrides_caller_env() {
    let executor = DockerExecutor::docker(ExecutorConfig::default());
    let env = HashMap::from([(ACTION_SPEC_ENV.to_string(), "stale".to_string())]);
    let config = executor
      .container_config(&action("build"), &env, Path::new("/c"), Path::new("/b"))
      .unwrap();
    assert_ne!(config.env_var(ACTION_SPEC_ENV), Some("stale"));
    assert_eq!(config.env.len(), 1);
  }
}
