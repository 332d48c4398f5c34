use std::fmt;
use std::str::FromStr;

use crate::error::RunnerError;

/// The closed set of runner kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerKind {
  Shell,
  GkeClusterProvisioner,
  Workflow,
  HelmChartDeployment,
}

impl RunnerKind {
  pub const ALL: [RunnerKind; 4] = [
    RunnerKind::Shell,
    RunnerKind::GkeClusterProvisioner,
    RunnerKind::Workflow,
    RunnerKind::HelmChartDeployment,
  ];

  /// Canonical kind string.
  pub fn as_str(&self) -> &'static str {
    match self {
      RunnerKind::Shell => "shell",
      RunnerKind::GkeClusterProvisioner => "gke-cluster-provisioner",
      RunnerKind::Workflow => "workflow",
      RunnerKind::HelmChartDeployment => "helm-chart-deployment",
    }
  }
}

impl fmt::Display for RunnerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RunnerKind {
  type Err = RunnerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "shell" => Ok(RunnerKind::Shell),
      "gke-cluster-provisioner" => Ok(RunnerKind::GkeClusterProvisioner),
      "workflow" => Ok(RunnerKind::Workflow),
      "helm-chart-deployment" | "helm-deploy" => Ok(RunnerKind::HelmChartDeployment),
      other => Err(RunnerError::RunnerNotFound {
        kind: other.to_string(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_canonical_names_parse_back() {
    for kind in RunnerKind::ALL {
      assert_eq!(kind.as_str().parse::<RunnerKind>().unwrap(), kind);
    }
  }

  #[test]
  fn test_helm_alias() {
    assert_eq!(
      "helm-deploy".parse::<RunnerKind>().unwrap(),
      RunnerKind::HelmChartDeployment
    );
  }

  #[test]
  fn test_unknown_kind() {
    let err = "Shell".parse::<RunnerKind>().unwrap_err();
    assert!(matches!(err, RunnerError::RunnerNotFound { kind } if kind == "Shell"));
  }
}
