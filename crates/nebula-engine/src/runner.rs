use std::collections::HashMap;
use std::sync::Arc;

use nebula_execution::{ActionExecutor, ExecutorError};
use nebula_plan::{Action, Plan, Workflow};
use nebula_runtime::RuntimeFactory;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::WorkflowError;

/// Environment key holding the running workflow's name.
pub const WORKFLOW_ENV: &str = "NEBULA_WORKFLOW";
/// Environment key holding the identifier of the current run.
pub const RUN_ID_ENV: &str = "NEBULA_RUN_ID";

/// Lifecycle of a [`WorkflowRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
  Created,
  Running,
  Completed,
  Failed,
}

/// Runs the actions of one workflow, in order, stopping at the first failure.
pub struct WorkflowRunner {
  workflow: String,
  actions: Vec<Action>,
  env: HashMap<String, String>,
  executor: Arc<dyn ActionExecutor>,
  state: WorkflowState,
}

impl std::fmt::Debug for WorkflowRunner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkflowRunner")
      .field("workflow", &self.workflow)
      .field("actions", &self.action_names())
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

impl WorkflowRunner {
  /// Select a workflow from `plan` and prepare it for running.
  ///
  /// A non-empty `name` must match a workflow exactly. An empty `name`
  /// selects the first workflow marked `default`.
  pub fn from_name(
    name: &str,
    plan: &Plan,
    executor: Arc<dyn ActionExecutor>,
  ) -> Result<Self, WorkflowError> {
    let selected = if name.is_empty() {
      plan.default_workflow()
    } else {
      plan.workflow(name)
    };
    let workflow = selected.ok_or_else(|| WorkflowError::WorkflowNotFound {
      name: name.to_string(),
    })?;
    Self::new(workflow, plan, executor)
  }

  /// Prepare `workflow`, resolving its actions against `plan`.
  pub fn new(
    workflow: &Workflow,
    plan: &Plan,
    executor: Arc<dyn ActionExecutor>,
  ) -> Result<Self, WorkflowError> {
    let defined: HashMap<&str, &Action> = plan
      .actions
      .iter()
      .rev()
      .map(|action| (action.name.as_str(), action))
      .collect();

    let actions = workflow
      .action_names
      .iter()
      .map(|name| {
        defined
          .get(name.as_str())
          .map(|action| (*action).clone())
          .ok_or_else(|| WorkflowError::ActionNotFound {
            workflow: workflow.name.clone(),
            action: name.clone(),
          })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let mut env: HashMap<String, String> = plan
      .variables
      .iter()
      .map(|v| (v.name.clone(), v.value.clone()))
      .collect();
    env.insert(WORKFLOW_ENV.to_string(), workflow.name.clone());

    Ok(Self {
      workflow: workflow.name.clone(),
      actions,
      env,
      executor,
      state: WorkflowState::Created,
    })
  }

  pub fn workflow(&self) -> &str {
    &self.workflow
  }

  /// Names of the resolved actions, in run order.
  pub fn action_names(&self) -> Vec<&str> {
    self.actions.iter().map(|a| a.name.as_str()).collect()
  }

  /// Environment shared by every action, without the per-run identifier.
  pub fn env(&self) -> &HashMap<String, String> {
    &self.env
  }

  pub fn state(&self) -> WorkflowState {
    self.state
  }

  /// Run every action in order.
  ///
  /// The first failing action's error is returned as is and the remaining
  /// actions are never scheduled. Already completed actions are not undone.
  #[instrument(
    name = "workflow_run",
    skip(self, cancel, runtimes),
    fields(workflow = %self.workflow)
  )]
  pub async fn run(
    &mut self,
    cancel: &CancellationToken,
    runtimes: &dyn RuntimeFactory,
  ) -> Result<(), WorkflowError> {
    let run_id = runtimes.run_id();
    self.state = WorkflowState::Running;
    info!(run_id = %run_id, actions = self.actions.len(), "workflow_started");

    let result = self.run_actions(cancel, runtimes, &run_id).await;

    match &result {
      Ok(()) => {
        self.state = WorkflowState::Completed;
        info!(run_id = %run_id, "workflow_completed");
      }
      Err(e) => {
        self.state = WorkflowState::Failed;
        error!(run_id = %run_id, error = %e, "workflow_failed");
      }
    }
    result
  }

  async fn run_actions(
    &self,
    cancel: &CancellationToken,
    runtimes: &dyn RuntimeFactory,
    run_id: &str,
  ) -> Result<(), WorkflowError> {
    let mut env = self.env.clone();
    env.insert(RUN_ID_ENV.to_string(), run_id.to_string());

    for action in &self.actions {
      if cancel.is_cancelled() {
        warn!(run_id, "workflow cancelled");
        return Err(ExecutorError::Cancelled.into());
      }

      let runtime = runtimes.runtime(run_id, &action.name);
      info!(run_id, action = %action.name, "action_started");
      self
        .executor
        .schedule_action(cancel, runtime.as_ref(), action, &env)
        .await?;
      info!(run_id, action = %action.name, "action_completed");
    }
    Ok(())
  }
}
