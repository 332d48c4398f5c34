use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a plan or workflow document.
#[derive(Debug, Error)]
pub enum PlanError {
  /// The document does not exist.
  #[error("plan file not found: {}", path.display())]
  FileNotFound { path: PathBuf },

  /// The document exists but could not be read.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The document is not structurally valid YAML for the expected type.
  #[error("failed to decode document: {source}")]
  Loader {
    #[source]
    source: serde_yaml::Error,
  },

  /// An action spec could not be rendered back to YAML.
  #[error("failed to serialize action spec: {source}")]
  SpecSerialization {
    #[source]
    source: serde_yaml::Error,
  },
}
