use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::plan::read_document;

/// An ordered pipeline of actions, selected by name or by the default flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub name: String,

  /// At most one workflow per plan should set this; the first one wins.
  #[serde(default)]
  pub default: bool,

  /// Action names in execution order.
  #[serde(rename = "actions", default)]
  pub action_names: Vec<String>,

  /// Conditions under which external layers start this workflow.
  /// They are carried but never evaluated by the execution core.
  #[serde(default, alias = "trigger", skip_serializing_if = "Vec::is_empty")]
  pub triggers: Vec<Trigger>,
}

/// A trigger conditional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
  /// Event type, e.g. "push" or "pull_request".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event: Option<String>,

  /// Tag spec, e.g. "v*".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,

  /// Branch spec, e.g. "main".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
}

impl Workflow {
  /// Load a standalone workflow document.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
    let content = read_document(path.as_ref()).await?;
    Self::from_yaml(&content)
  }

  /// Parse a standalone workflow document.
  pub fn from_yaml(source: &str) -> Result<Self, PlanError> {
    serde_yaml::from_str(source).map_err(|e| PlanError::Loader { source: e })
  }
}
