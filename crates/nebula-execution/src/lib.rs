//! Container-based action execution for nebula.
//!
//! [`DockerExecutor`] runs exactly one action as a container and reports
//! success or failure synchronously:
//!
//! ```text
//! pull image ─► prepare config ─► create ─► register wait ─► start
//!                                                              │
//!             exit status ◄─ wait (error | status | cancel) ◄─ stream logs
//! ```
//!
//! The action's spec reaches the container through a single environment
//! variable, [`ACTION_SPEC_ENV`], holding base64 of the spec's canonical
//! JSON (see [`encoding`]).
//!
//! The container daemon sits behind the [`ContainerEngine`] trait;
//! [`DockerCli`] implements it by driving the `docker` command line.

mod config;
mod docker_cli;
mod engine;
pub mod encoding;
mod error;
mod executor;

pub use config::{DEFAULT_DOCKER_SOCKET, ExecutorConfig, RegistryAuth};
pub use docker_cli::DockerCli;
pub use encoding::{ACTION_SPEC_ENV, Base64Encoder, EncodeError, SpecEncoder};
pub use engine::{Bind, ContainerConfig, ContainerEngine, ContainerWait, DockerError, WaitStatus};
pub use error::{ExecutorError, Step};
pub use executor::{
  ActionExecutor, BUILD_MOUNT, DockerExecutor, RUNNER_CONTEXT_MOUNT, RUNNER_CONTEXT_PREFIX,
};
