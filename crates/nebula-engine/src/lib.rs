//! Workflow execution for nebula.
//!
//! A [`WorkflowRunner`] picks one workflow out of a [`Plan`](nebula_plan::Plan),
//! resolves its action names up front and then hands the actions, in
//! declared order, to an [`ActionExecutor`](nebula_execution::ActionExecutor).
//! The first failing action stops the run.

mod error;
mod runner;

pub use error::WorkflowError;
pub use runner::{RUN_ID_ENV, WORKFLOW_ENV, WorkflowRunner, WorkflowState};
