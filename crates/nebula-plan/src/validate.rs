//! Opt-in semantic checks over a parsed plan.

use std::collections::HashSet;

use thiserror::Error;

use crate::plan::Plan;

/// A semantic problem found in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanIssue {
  #[error("variable '{0}' is declared more than once")]
  DuplicateVariable(String),

  #[error("action '{0}' is declared more than once")]
  DuplicateAction(String),

  #[error("workflow '{0}' is declared more than once")]
  DuplicateWorkflow(String),

  #[error("workflows {0:?} are all marked default; the first one is used")]
  MultipleDefaults(Vec<String>),

  #[error("workflow '{workflow}' references undefined action '{action}'")]
  UndefinedAction { workflow: String, action: String },
}

impl Plan {
  /// Check the plan for problems that loading does not catch.
  ///
  /// Returns every issue found, in declaration order. An empty list means
  /// every workflow can be resolved.
  pub fn validate(&self) -> Vec<PlanIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for variable in &self.variables {
      if !seen.insert(variable.name.as_str()) {
        issues.push(PlanIssue::DuplicateVariable(variable.name.clone()));
      }
    }

    let mut actions = HashSet::new();
    for action in &self.actions {
      if !actions.insert(action.name.as_str()) {
        issues.push(PlanIssue::DuplicateAction(action.name.clone()));
      }
    }

    let mut seen = HashSet::new();
    for workflow in &self.workflows {
      if !seen.insert(workflow.name.as_str()) {
        issues.push(PlanIssue::DuplicateWorkflow(workflow.name.clone()));
      }
    }

    let defaults: Vec<String> = self
      .workflows
      .iter()
      .filter(|w| w.default)
      .map(|w| w.name.clone())
      .collect();
    if defaults.len() > 1 {
      issues.push(PlanIssue::MultipleDefaults(defaults));
    }

    for workflow in &self.workflows {
      for action in &workflow.action_names {
        if !actions.contains(action.as_str()) {
          issues.push(PlanIssue::UndefinedAction {
            workflow: workflow.name.clone(),
            action: action.clone(),
          });
        }
      }
    }

    issues
  }
}

#[cfg(test)]
mod tests {
  use crate::Plan;

  use super::PlanIssue;

  #[test]
  fn test_valid_plan_has_no_issues() {
    let plan = Plan::from_yaml(
      r#"
actions:
  - name: a
    image: busybox
workflows:
  - name: main
    default: true
    actions: [a]
"#,
    )
    .unwrap();

    assert!(plan.validate().is_empty());
  }

  #[test]
  fn test_reports_all_issues() {
    let plan = Plan::from_yaml(
      r#"
variables:
  - { name: x, value: "1" }
  - { name: x, value: "2" }
actions:
  - name: a
    image: busybox
  - name: a
    image: alpine
workflows:
  - name: one
    default: true
    actions: [a, missing]
  - name: two
    default: true
    actions: []
"#,
    )
    .unwrap();

    assert_eq!(
      plan.validate(),
      vec![
        PlanIssue::DuplicateVariable("x".to_string()),
        PlanIssue::DuplicateAction("a".to_string()),
        PlanIssue::MultipleDefaults(vec!["one".to_string(), "two".to_string()]),
        PlanIssue::UndefinedAction {
          workflow: "one".to_string(),
          action: "missing".to_string(),
        },
      ]
    );
  }
}
