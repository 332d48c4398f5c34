//! Drives [`DockerCli`] against a stub `docker` script.
//!
//! Everything runs in a single test so the stub is never executed while
//! another thread of this binary holds it open for writing.

#![cfg(unix)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use nebula_execution::{
  ActionExecutor, DockerCli, DockerError, DockerExecutor, ExecutorConfig, ExecutorError,
  RegistryAuth,
};
use nebula_plan::{Action, ActionSpec};
use nebula_runtime::{DefaultRuntimeFactory, RuntimeFactory, RuntimeIo, SharedBuffer};
use tokio_util::sync::CancellationToken;

const STUB: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/calls.log"
cmd="$1"
shift
case "$cmd" in
  login)
    password=$(cat)
    if [ "$password" != "secret" ]; then
      echo "bad credentials" >&2
      exit 1
    fi
    ;;
  pull)
    case "$1" in
      missing) echo "manifest unknown" >&2; exit 1 ;;
    esac
    echo "pulled $1"
    ;;
  create)
    for last in "$@"; do :; done
    echo "$last"
    ;;
  inspect)
    case "$3" in
      refused) echo "created" ;;
      *) echo "exited" ;;
    esac
    ;;
  start)
    id="$2"
    if [ "$id" = "refused" ]; then
      echo "Error response from daemon: failed to create task: no such file" >&2
      exit 1
    fi
    echo "out from $id"
    echo "err from $id" >&2
    case "$id" in
      exit-*) exit "${id#exit-}" ;;
    esac
    ;;
  rm) ;;
  *)
    echo "unexpected command $cmd" >&2
    exit 1
    ;;
esac
"#;

fn write_stub(dir: &Path) -> std::path::PathBuf {
  let path = dir.join("docker");
  std::fs::write(&path, STUB).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

fn action(image: &str) -> Action {
  Action {
    name: "stub".to_string(),
    image: image.to_string(),
    resource_id: String::new(),
    kind: None,
    spec: ActionSpec::from_yaml("script: true\n").unwrap(),
  }
}

#[tokio::test]
async fn test_docker_cli_lifecycle_against_stub() {
  let bin = tempfile::tempdir().unwrap();
  let stub = write_stub(bin.path());

  let out = SharedBuffer::new();
  let err = SharedBuffer::new();
  let factory = DefaultRuntimeFactory::new(RuntimeIo::new(out.clone(), err.clone()));
  let runtime = factory.runtime("run-1", "stub");
  let cancel = CancellationToken::new();
  let env = HashMap::new();

  let executor = DockerExecutor::new(
    Arc::new(DockerCli::with_program(&stub)),
    ExecutorConfig::default(),
  );

  // Success: pull progress and container output reach the runtime.
  executor
    .schedule_action(&cancel, runtime.as_ref(), &action("exit-0"), &env)
    .await
    .unwrap();
  let stdout = out.to_string_lossy();
  assert!(stdout.contains("pulled exit-0\n"));
  assert!(stdout.contains("out from exit-0\n"));
  assert_eq!(err.to_string_lossy(), "err from exit-0\n");

  // The attached process reports the container's exit code.
  let failed = executor
    .schedule_action(&cancel, runtime.as_ref(), &action("exit-3"), &env)
    .await
    .unwrap_err();
  assert_eq!(failed.exit_code(), Some(3));

  // Pull errors carry docker's diagnostics.
  let failed = executor
    .schedule_action(&cancel, runtime.as_ref(), &action("missing"), &env)
    .await
    .unwrap_err();
  match failed {
    ExecutorError::ImagePull {
      source: DockerError::Command { stderr, .. },
      ..
    } => assert_eq!(stderr, "manifest unknown"),
    other => panic!("unexpected error: {other}"),
  }

  // A start refused by the daemon is a start failure, and the created
  // container is removed.
  let failed = executor
    .schedule_action(&cancel, runtime.as_ref(), &action("refused"), &env)
    .await
    .unwrap_err();
  match &failed {
    ExecutorError::ContainerStart {
      name,
      source: DockerError::Command { stderr, .. },
    } => {
      assert!(name.starts_with("nebula-action-stub-"));
      assert!(stderr.starts_with("Error response from daemon: failed to create task"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(failed.exit_code(), None);
  let calls = std::fs::read_to_string(bin.path().join("calls.log")).unwrap();
  assert!(calls.lines().any(|line| line == "rm --force refused"));
  assert!(!calls.lines().any(|line| line == "rm --force exit-0"));

  // Credentials are passed to `docker login` on stdin.
  let auth = |password: &str| ExecutorConfig {
    registry: Some(RegistryAuth {
      host: "ghcr.io".to_string(),
      username: "ci".to_string(),
      password: password.to_string(),
    }),
    ..Default::default()
  };
  let executor = DockerExecutor::new(Arc::new(DockerCli::with_program(&stub)), auth("secret"));
  executor
    .schedule_action(&cancel, runtime.as_ref(), &action("exit-0"), &env)
    .await
    .unwrap();

  let executor = DockerExecutor::new(Arc::new(DockerCli::with_program(&stub)), auth("wrong"));
  let failed = executor
    .schedule_action(&cancel, runtime.as_ref(), &action("exit-0"), &env)
    .await
    .unwrap_err();
  assert!(matches!(failed, ExecutorError::ImagePull { .. }));
  assert!(failed.to_string().contains("bad credentials"));
}
