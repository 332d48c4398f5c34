use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nebula_engine::WorkflowRunner;
use nebula_execution::encoding::decode_action_spec;
use nebula_execution::{ACTION_SPEC_ENV, DockerExecutor, ExecutorConfig, RegistryAuth};
use nebula_plan::Plan;
use nebula_runner::{RunnerKind, decode_runner};
use nebula_runtime::{DefaultRuntimeFactory, RuntimeFactory};

/// Nebula - runs plan workflows as sequences of containerized actions
#[derive(Parser)]
#[command(name = "nebula")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a single action
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Inspect plan files
  Plan {
    #[command(subcommand)]
    command: PlanCommand,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run a workflow of a plan, one container per action
  Workflow {
    /// Path to the plan file (YAML)
    plan_file: PathBuf,

    /// Workflow to run; the plan's default workflow when omitted
    #[arg(long, short, default_value = "")]
    workflow: String,

    #[command(flatten)]
    executor: ExecutorArgs,
  },

  /// Run one action in-process from its encoded spec
  ///
  /// This is the entrypoint of action images: the spec is read from the
  /// NEBULA_ACTION_SPEC environment variable.
  Action {
    /// Runner kind, e.g. shell or helm-chart-deployment
    kind: String,

    /// Resource the action manages
    #[arg(long, env = "NEBULA_RESOURCE_ID", default_value = "")]
    resource_id: String,
  },
}

#[derive(Subcommand)]
enum PlanCommand {
  /// Check a plan for duplicate names and dangling references
  Validate {
    /// Path to the plan file (YAML)
    plan_file: PathBuf,
  },
}

#[derive(Args)]
struct ExecutorArgs {
  /// Docker daemon socket, mounted into every action container
  #[arg(
    long,
    env = "NEBULA_DOCKER_SOCKET",
    default_value = nebula_execution::DEFAULT_DOCKER_SOCKET
  )]
  docker_socket: PathBuf,

  /// Registry to log in to before pulling action images
  #[arg(
    long,
    env = "NEBULA_REGISTRY_HOST",
    requires_all = ["registry_username", "registry_password"]
  )]
  registry_host: Option<String>,

  #[arg(long, env = "NEBULA_REGISTRY_USERNAME")]
  registry_username: Option<String>,

  #[arg(long, env = "NEBULA_REGISTRY_PASSWORD", hide_env_values = true)]
  registry_password: Option<String>,

  /// Seconds to allow for an image pull
  #[arg(long, env = "NEBULA_PULL_TIMEOUT", value_parser = parse_seconds)]
  pull_timeout: Option<Duration>,

  /// Seconds to allow for a container start
  #[arg(long, env = "NEBULA_START_TIMEOUT", value_parser = parse_seconds)]
  start_timeout: Option<Duration>,

  /// Seconds to allow an action container to run
  #[arg(long, env = "NEBULA_WAIT_TIMEOUT", value_parser = parse_seconds)]
  wait_timeout: Option<Duration>,

  /// Keep each action's runner context directory after it finishes
  #[arg(long, env = "NEBULA_KEEP_RUNNER_CONTEXT")]
  keep_runner_context: bool,
}

impl ExecutorArgs {
  fn into_config(self) -> ExecutorConfig {
    let registry = match (
      self.registry_host,
      self.registry_username,
      self.registry_password,
    ) {
      (Some(host), Some(username), Some(password)) => Some(RegistryAuth {
        host,
        username,
        password,
      }),
      _ => None,
    };
    ExecutorConfig {
      docker_socket: self.docker_socket,
      registry,
      pull_timeout: self.pull_timeout,
      start_timeout: self.start_timeout,
      wait_timeout: self.wait_timeout,
      keep_runner_context: self.keep_runner_context,
    }
  }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
  value
    .parse::<u64>()
    .map(Duration::from_secs)
    .map_err(|e| format!("expected a number of seconds: {}", e))
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Some(Commands::Run { target }) => {
      let rt = tokio::runtime::Runtime::new()?;
      match target {
        RunTarget::Workflow {
          plan_file,
          workflow,
          executor,
        } => rt.block_on(run_workflow(plan_file, workflow, executor.into_config()))?,
        RunTarget::Action { kind, resource_id } => {
          rt.block_on(run_action(kind, resource_id))?
        }
      }
    }
    Some(Commands::Plan {
      command: PlanCommand::Validate { plan_file },
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(validate_plan(plan_file))?;
    }
    None => {
      println!("nebula - use --help to see available commands");
    }
  }

  Ok(())
}

/// A token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling");
      trigger.cancel();
    }
  });
  cancel
}

async fn run_workflow(plan_file: PathBuf, workflow: String, config: ExecutorConfig) -> Result<()> {
  let plan = Plan::load(&plan_file)
    .await
    .with_context(|| format!("failed to load plan: {}", plan_file.display()))?;

  let executor = Arc::new(DockerExecutor::docker(config));
  let mut runner = WorkflowRunner::from_name(&workflow, &plan, executor)
    .with_context(|| format!("failed to prepare workflow from {}", plan_file.display()))?;

  info!(
    workflow = runner.workflow(),
    actions = ?runner.action_names(),
    "running workflow"
  );

  let cancel = shutdown_token();
  runner
    .run(&cancel, &DefaultRuntimeFactory::stdio())
    .await
    .with_context(|| format!("workflow '{}' failed", runner.workflow()))?;

  Ok(())
}

async fn run_action(kind: String, resource_id: String) -> Result<()> {
  let encoded = std::env::var(ACTION_SPEC_ENV)
    .with_context(|| format!("{} is not set", ACTION_SPEC_ENV))?;
  let spec = decode_action_spec(&encoded).context("failed to decode action spec")?;

  // JSON is valid YAML, so the decoded spec feeds the runner's YAML decoder.
  let document = serde_json::to_vec(&spec)?;
  let runner = decode_runner(&kind, &document)
    .with_context(|| format!("failed to prepare '{}' runner", kind))?;

  let variables: HashMap<String, String> = std::env::vars().collect();
  let factory = DefaultRuntimeFactory::stdio();
  let run_id = variables
    .get("NEBULA_RUN_ID")
    .cloned()
    .unwrap_or_else(|| factory.run_id());
  let runtime = factory.runtime(&run_id, &kind);

  let cancel = shutdown_token();
  runner
    .run(&cancel, &resource_id, runtime.as_ref(), &variables)
    .await
    .with_context(|| format!("'{}' action failed", kind))?;

  Ok(())
}

async fn validate_plan(plan_file: PathBuf) -> Result<()> {
  let plan = Plan::load(&plan_file)
    .await
    .with_context(|| format!("failed to load plan: {}", plan_file.display()))?;

  let mut issues: Vec<String> = plan.validate().iter().map(ToString::to_string).collect();
  for action in &plan.actions {
    if let Some(kind) = &action.kind {
      if let Err(e) = kind.parse::<RunnerKind>() {
        issues.push(format!("action '{}': {}", action.name, e));
      }
    }
  }

  if issues.is_empty() {
    println!(
      "{}: {} actions, {} workflows, no issues",
      plan_file.display(),
      plan.actions.len(),
      plan.workflows.len()
    );
    return Ok(());
  }

  for issue in &issues {
    println!("{}: {}", plan_file.display(), issue);
  }
  bail!("{} issue(s) found in {}", issues.len(), plan_file.display())
}
