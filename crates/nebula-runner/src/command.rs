//! External command execution for runners.

use std::collections::HashMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};

use nebula_runtime::{ActionRuntime, RuntimeIo};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::error::RunnerError;

/// A command line a runner wants executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub env: HashMap<String, String>,
}

impl Invocation {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Default::default()
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn envs<'a, I>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (&'a String, &'a String)>,
  {
    self
      .env
      .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  /// Run the command to completion.
  ///
  /// Stdout and stderr are streamed into the runtime's streams as they
  /// arrive. The child is killed if `cancel` fires first.
  pub async fn run(
    &self,
    runtime: &dyn ActionRuntime,
    cancel: &CancellationToken,
  ) -> Result<(), RunnerError> {
    let span = runtime.span().clone();
    self.run_inner(runtime.io(), cancel).instrument(span).await
  }

  async fn run_inner(&self, io: &RuntimeIo, cancel: &CancellationToken) -> Result<(), RunnerError> {
    if cancel.is_cancelled() {
      return Err(RunnerError::Cancelled);
    }

    debug!(command = %self, "spawning command");

    let mut child = Command::new(&self.program)
      .args(&self.args)
      .envs(&self.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| RunnerError::Spawn {
        program: self.program.clone(),
        source: e,
      })?;

    let outcome = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      status = drive(&mut child, io) => Some(status),
    };

    let Some(status) = outcome else {
      if let Err(e) = child.kill().await {
        warn!(program = %self.program, error = %e, "failed to kill cancelled command");
      }
      return Err(RunnerError::Cancelled);
    };

    let status = status?;
    if status.success() {
      info!(program = %self.program, "command completed");
      Ok(())
    } else {
      Err(RunnerError::CommandFailed {
        program: self.program.clone(),
        exit_code: status.code(),
      })
    }
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      if arg.contains(char::is_whitespace) {
        write!(f, " {:?}", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

/// Pump both output pipes to EOF, then reap the child.
async fn drive(child: &mut Child, io: &RuntimeIo) -> Result<ExitStatus, RunnerError> {
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  let pump_out = async {
    match stdout {
      Some(stdout) => io.copy_out(stdout).await.map(|_| ()),
      None => Ok(()),
    }
  };
  let pump_err = async {
    match stderr {
      Some(stderr) => io.copy_err(stderr).await.map(|_| ()),
      None => Ok(()),
    }
  };

  let (out, err) = tokio::join!(pump_out, pump_err);
  out
    .and(err)
    .map_err(|e| RunnerError::Output { source: e })?;

  child
    .wait()
    .await
    .map_err(|e| RunnerError::Output { source: e })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_quotes_whitespace() {
    let invocation = Invocation::new("sh").args(["-c", "echo hello"]);
    assert_eq!(invocation.to_string(), "sh -c \"echo hello\"");
  }

  #[test]
  fn test_envs_are_merged() {
    let vars = HashMap::from([("A".to_string(), "1".to_string())]);
    let invocation = Invocation::new("env").envs(&vars);
    assert_eq!(invocation.env.get("A").map(String::as_str), Some("1"));
  }
}
