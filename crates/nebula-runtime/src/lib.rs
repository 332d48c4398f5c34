//! Runtime abstraction for nebula action execution.
//!
//! Executors and runners never write to the process's stdio or pick log
//! destinations themselves. They receive an [`ActionRuntime`], which bundles
//! the output streams for the action ([`RuntimeIo`]) with the tracing span
//! its diagnostics belong to. A [`RuntimeFactory`] hands out one runtime per
//! action and supplies the run identifier for a workflow run.

mod buffer;
mod io;
mod runtime;

pub use buffer::SharedBuffer;
pub use io::RuntimeIo;
pub use runtime::{ActionRuntime, DefaultRuntime, DefaultRuntimeFactory, RuntimeFactory};
