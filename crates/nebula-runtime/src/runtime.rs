//! Per-action runtimes and the factory that creates them.

use std::sync::Arc;

use tracing::{Span, info_span};

use crate::io::RuntimeIo;

/// Capabilities available to an executing action.
pub trait ActionRuntime: Send + Sync {
  /// Output streams for the action's human readable progress.
  fn io(&self) -> &RuntimeIo;

  /// The span that diagnostics for this action are recorded under.
  fn span(&self) -> &Span;
}

/// Creates the runtime for each action of a workflow run.
pub trait RuntimeFactory: Send + Sync {
  /// Identifier for a new workflow run.
  fn run_id(&self) -> String {
    uuid::Uuid::new_v4().to_string()
  }

  /// Runtime for one action of the run.
  fn runtime(&self, run_id: &str, action: &str) -> Box<dyn ActionRuntime>;
}

/// A runtime that writes to shared streams and logs under an `action` span.
pub struct DefaultRuntime {
  io: Arc<RuntimeIo>,
  span: Span,
}

impl DefaultRuntime {
  pub fn new(io: Arc<RuntimeIo>, span: Span) -> Self {
    Self { io, span }
  }
}

impl ActionRuntime for DefaultRuntime {
  fn io(&self) -> &RuntimeIo {
    &self.io
  }

  fn span(&self) -> &Span {
    &self.span
  }
}

/// Hands out [`DefaultRuntime`]s that share one set of streams.
pub struct DefaultRuntimeFactory {
  io: Arc<RuntimeIo>,
  run_id: Option<String>,
}

impl DefaultRuntimeFactory {
  pub fn new(io: RuntimeIo) -> Self {
    Self {
      io: Arc::new(io),
      run_id: None,
    }
  }

  /// Factory writing to the process's stdout and stderr.
  pub fn stdio() -> Self {
    Self::new(RuntimeIo::stdio())
  }

  /// Use a caller supplied run identifier instead of generating one.
  pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
    self.run_id = Some(run_id.into());
    self
  }
}

impl RuntimeFactory for DefaultRuntimeFactory {
  fn run_id(&self) -> String {
    match &self.run_id {
      Some(id) => id.clone(),
      None => uuid::Uuid::new_v4().to_string(),
    }
  }

  fn runtime(&self, run_id: &str, action: &str) -> Box<dyn ActionRuntime> {
    let span = info_span!("action", run_id = %run_id, action = %action);
    Box::new(DefaultRuntime::new(self.io.clone(), span))
  }
}
