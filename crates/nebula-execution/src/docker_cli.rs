//! [`ContainerEngine`] backed by the `docker` command line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nebula_runtime::RuntimeIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::RegistryAuth;
use crate::engine::{ContainerConfig, ContainerEngine, ContainerWait, DockerError, WaitStatus};

const START_POLL_INTERVAL: Duration = Duration::from_millis(50);

type WaitSenders = (oneshot::Sender<WaitStatus>, oneshot::Sender<DockerError>);

/// Per-container state between `wait_container` and `stream_logs`.
#[derive(Default)]
struct Attachment {
  waiters: Option<WaitSenders>,
  attached: Option<Child>,
}

/// Drives the docker daemon through its CLI.
///
/// Containers are started with `docker start --attach`; the attached
/// process carries the container's output and exits with its status, so an
/// auto-removed container can never outrun its own logs or wait. A start
/// only succeeds once `docker inspect` no longer reports the container as
/// `created`.
pub struct DockerCli {
  program: PathBuf,
  containers: Mutex<HashMap<String, Attachment>>,
}

impl Default for DockerCli {
  fn default() -> Self {
    Self::new()
  }
}

impl DockerCli {
  pub fn new() -> Self {
    Self::with_program("docker")
  }

  /// Use a different client binary, e.g. `podman` or a test double.
  pub fn with_program(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      containers: Mutex::new(HashMap::new()),
    }
  }

  /// Arguments of the `docker create` call for a container.
  pub fn create_args(name: &str, config: &ContainerConfig) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];
    if config.privileged {
      args.push("--privileged".to_string());
    }
    if config.auto_remove {
      args.push("--rm".to_string());
    }
    if let Some(network) = &config.network {
      args.push("--network".to_string());
      args.push(network.clone());
    }
    for entry in &config.env {
      args.push("-e".to_string());
      args.push(entry.clone());
    }
    for bind in &config.binds {
      args.push("-v".to_string());
      args.push(bind.spec());
    }
    args.push(config.image.clone());
    args
  }

  fn command(&self, args: &[String]) -> Command {
    let mut command = Command::new(&self.program);
    command.args(args).kill_on_drop(true);
    command
  }

  fn spawn(&self, args: &[String], stdin: Stdio) -> Result<Child, DockerError> {
    debug!(program = %self.program.display(), args = ?redact(args), "running docker");
    self
      .command(args)
      .stdin(stdin)
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| DockerError::Spawn {
        command: subcommand(args),
        source: e,
      })
  }

  /// Run a docker command to completion, returning its trimmed stdout.
  async fn output(&self, args: &[String], input: Option<&[u8]>) -> Result<String, DockerError> {
    let stdin = if input.is_some() {
      Stdio::piped()
    } else {
      Stdio::null()
    };
    let mut child = self.spawn(args, stdin)?;

    if let (Some(input), Some(mut pipe)) = (input, child.stdin.take()) {
      pipe.write_all(input).await?;
      pipe.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
      return Err(DockerError::Command {
        command: subcommand(args),
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  async fn login(&self, auth: &RegistryAuth) -> Result<(), DockerError> {
    let args = [
      "login".to_string(),
      auth.host.clone(),
      "--username".to_string(),
      auth.username.clone(),
      "--password-stdin".to_string(),
    ];
    self.output(&args, Some(auth.password.as_bytes())).await?;
    Ok(())
  }

  fn take_attachment(&self, id: &str) -> Attachment {
    match self.containers.lock() {
      Ok(mut containers) => containers.remove(id).unwrap_or_default(),
      Err(poisoned) => poisoned.into_inner().remove(id).unwrap_or_default(),
    }
  }

  fn with_attachment(&self, id: &str, f: impl FnOnce(&mut Attachment)) {
    let mut containers = match self.containers.lock() {
      Ok(containers) => containers,
      Err(poisoned) => poisoned.into_inner(),
    };
    f(containers.entry(id.to_string()).or_default());
  }

  /// Current `State.Status` of a container, None once it is gone.
  async fn container_status(&self, id: &str) -> Option<String> {
    let args = [
      "inspect".to_string(),
      "--format".to_string(),
      "{{.State.Status}}".to_string(),
      id.to_string(),
    ];
    self.output(&args, None).await.ok()
  }

  /// Wait until the container has left the `created` state.
  ///
  /// An attached start that exits while the container is still `created`
  /// was refused by the daemon; its stderr becomes the error.
  async fn confirm_started(&self, id: &str, child: &mut Child) -> Result<(), DockerError> {
    loop {
      let exited = child.try_wait()?;
      match self.container_status(id).await.as_deref() {
        Some("created") => {}
        _ => return Ok(()),
      }

      if let Some(status) = exited {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
          pipe.read_to_string(&mut stderr).await?;
        }
        return Err(DockerError::Command {
          command: "start".to_string(),
          exit_code: status.code(),
          stderr: stderr.trim().to_string(),
        });
      }
      tokio::time::sleep(START_POLL_INTERVAL).await;
    }
  }

  /// `docker logs --follow`, for containers this client did not start.
  async fn follow_logs(&self, id: &str, io: &RuntimeIo) -> Result<(), DockerError> {
    let args = ["logs".to_string(), "--follow".to_string(), id.to_string()];
    let mut child = self.spawn(&args, Stdio::null())?;
    pump(&mut child, io).await?;
    let status = child.wait().await?;
    if !status.success() {
      return Err(DockerError::Command {
        command: subcommand(&args),
        exit_code: status.code(),
        stderr: String::new(),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl ContainerEngine for DockerCli {
  async fn pull_image(
    &self,
    image: &str,
    auth: Option<&RegistryAuth>,
    io: &RuntimeIo,
  ) -> Result<(), DockerError> {
    if let Some(auth) = auth {
      self.login(auth).await?;
    }

    let args = ["pull".to_string(), image.to_string()];
    let mut child = self.spawn(&args, Stdio::null())?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let progress = async {
      match stdout {
        Some(stdout) => io.copy_out(stdout).await.map(|_| ()),
        None => Ok(()),
      }
    };
    let diagnostics = async {
      let mut text = String::new();
      if let Some(mut stderr) = stderr {
        stderr.read_to_string(&mut text).await?;
      }
      Ok::<_, std::io::Error>(text)
    };
    let (progress, diagnostics) = tokio::join!(progress, diagnostics);
    progress?;
    let diagnostics = diagnostics?;

    let status = child.wait().await?;
    if !status.success() {
      return Err(DockerError::Command {
        command: subcommand(&args),
        exit_code: status.code(),
        stderr: diagnostics.trim().to_string(),
      });
    }
    Ok(())
  }

  async fn create_container(
    &self,
    name: &str,
    config: &ContainerConfig,
  ) -> Result<String, DockerError> {
    let args = Self::create_args(name, config);
    let id = self.output(&args, None).await?;
    if id.is_empty() || id.contains(char::is_whitespace) {
      return Err(DockerError::UnexpectedOutput {
        command: subcommand(&args),
        output: id,
      });
    }
    Ok(id)
  }

  async fn wait_container(&self, id: &str) -> Result<ContainerWait, DockerError> {
    let (status_tx, error_tx, wait) = ContainerWait::channel();
    self.with_attachment(id, |attachment| {
      attachment.waiters = Some((status_tx, error_tx));
    });
    Ok(wait)
  }

  async fn start_container(&self, id: &str) -> Result<(), DockerError> {
    let args = ["start".to_string(), "--attach".to_string(), id.to_string()];
    let mut child = self.spawn(&args, Stdio::null())?;
    self.confirm_started(id, &mut child).await?;
    self.with_attachment(id, |attachment| attachment.attached = Some(child));
    Ok(())
  }

  async fn stream_logs(&self, id: &str, io: &RuntimeIo) -> Result<(), DockerError> {
    let Attachment { waiters, attached } = self.take_attachment(id);
    let Some(mut child) = attached else {
      return self.follow_logs(id, io).await;
    };

    let streamed = pump(&mut child, io).await;
    let exited = child.wait().await;

    if let Some((status_tx, error_tx)) = waiters {
      let report = match exited {
        Ok(status) => status.code().map(|code| WaitStatus {
          exit_code: i64::from(code),
        }),
        Err(e) => {
          let _ = error_tx.send(DockerError::Io(e));
          None
        }
      };
      match report {
        Some(status) => {
          let _ = status_tx.send(status);
        }
        None => debug!(container = id, "attached process ended without an exit code"),
      }
    }

    streamed.map_err(DockerError::Io)
  }

  async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
    let Attachment { attached, .. } = self.take_attachment(id);
    if let Some(mut child) = attached {
      if let Err(e) = child.kill().await {
        warn!(container = id, error = %e, "failed to stop attached docker process");
      }
    }
    let args = ["rm".to_string(), "--force".to_string(), id.to_string()];
    self.output(&args, None).await?;
    Ok(())
  }
}

async fn pump(child: &mut Child, io: &RuntimeIo) -> std::io::Result<()> {
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let out = async {
    match stdout {
      Some(stdout) => io.copy_out(stdout).await.map(|_| ()),
      None => Ok(()),
    }
  };
  let err = async {
    match stderr {
      Some(stderr) => io.copy_err(stderr).await.map(|_| ()),
      None => Ok(()),
    }
  };
  let (out, err) = tokio::join!(out, err);
  out.and(err)
}

fn subcommand(args: &[String]) -> String {
  args.first().cloned().unwrap_or_default()
}

// Environment values may carry secrets; log only their keys.
fn redact(args: &[String]) -> Vec<String> {
  let mut redacted = Vec::with_capacity(args.len());
  let mut env_next = false;
  for arg in args {
    if env_next {
      let key = arg.split_once('=').map(|(k, _)| k).unwrap_or(arg);
      redacted.push(format!("{}=…", key));
    } else {
      redacted.push(arg.clone());
    }
    env_next = arg == "-e";
  }
  redacted
}
