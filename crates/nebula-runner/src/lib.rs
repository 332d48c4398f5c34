//! Action runners for nebula.
//!
//! A runner is a handler for one kind of action. The set of kinds is
//! closed: [`new_runner`] maps a kind string to a zero-valued runner, and an
//! unknown kind is an error rather than an extension point.
//!
//! ```ignore
//! let mut runner = nebula_runner::new_runner("shell")?;
//! runner.decode(b"script: echo hello")?;
//! runner.run(&cancel, "", runtime.as_ref(), &variables).await?;
//! ```
//!
//! Runners that drive external tooling (shell, gcloud, helm) do so through
//! [`Invocation`], which streams the child's output into the action's
//! [`ActionRuntime`](nebula_runtime::ActionRuntime) and honours cancellation.

mod command;
mod error;
mod kind;
mod kinds;
mod registry;

pub use command::Invocation;
pub use error::RunnerError;
pub use kind::RunnerKind;
pub use kinds::{
  GkeClusterProvisioner, GkeClusterSpec, HelmChartDeployment, HelmChartSpec, NestedWorkflow,
  NestedWorkflowSpec, Shell, ShellSpec,
};
pub use registry::{ActionRunner, decode_runner, new_runner};
