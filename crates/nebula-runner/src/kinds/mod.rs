//! Concrete runner kinds.

mod gke;
mod helm;
mod shell;
mod workflow;

pub use gke::{GkeClusterProvisioner, GkeClusterSpec};
pub use helm::{HelmChartDeployment, HelmChartSpec};
pub use shell::{Shell, ShellSpec};
pub use workflow::{NestedWorkflow, NestedWorkflowSpec};
