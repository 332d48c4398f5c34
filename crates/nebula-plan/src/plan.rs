use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::PlanError;
use crate::workflow::Workflow;

/// A named value used to seed the execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
  pub name: String,
  #[serde(default)]
  pub value: String,
}

/// The top-level parsed plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub variables: Vec<Variable>,
  #[serde(default)]
  pub actions: Vec<Action>,
  #[serde(default)]
  pub workflows: Vec<Workflow>,
}

impl Plan {
  /// Load a plan from a YAML file.
  ///
  /// Only structural decoding happens here. Dangling action references
  /// are reported when a workflow is resolved for execution.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
    let content = read_document(path.as_ref()).await?;
    Self::from_yaml(&content)
  }

  /// Parse a plan from YAML text.
  pub fn from_yaml(source: &str) -> Result<Self, PlanError> {
    serde_yaml::from_str(source).map_err(|e| PlanError::Loader { source: e })
  }

  /// Get an action by name.
  pub fn action(&self, name: &str) -> Option<&Action> {
    self.actions.iter().find(|a| a.name == name)
  }

  /// Get a workflow by exact name.
  pub fn workflow(&self, name: &str) -> Option<&Workflow> {
    self.workflows.iter().find(|w| w.name == name)
  }

  /// The first workflow flagged as default, in declaration order.
  pub fn default_workflow(&self) -> Option<&Workflow> {
    self.workflows.iter().find(|w| w.default)
  }
}

pub(crate) async fn read_document(path: &Path) -> Result<String, PlanError> {
  tokio::fs::read_to_string(path)
    .await
    .map_err(|e| match e.kind() {
      ErrorKind::NotFound => PlanError::FileNotFound {
        path: path.to_path_buf(),
      },
      _ => PlanError::Io {
        path: path.to_path_buf(),
        source: e,
      },
    })
}
