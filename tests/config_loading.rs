// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use dagpoll::config::model::{INVOCATION_ID_ENV, STORE_ROOT_ENV};
use dagpoll::config::{load_and_validate_with_env, load_from_path};
use dagpoll::errors::DagpollError;
use dagpoll_test_utils::WorkflowFileBuilder;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

const FULL_WORKFLOW: &str = r#"
[workflow]
name = "IntegrationTestWorkflow"
entrypoint = "create-input"
invocation_id = "6f1c0e1a"

[monitor]
timeout_secs = 180
stream_logs = true

[store]
root = "/mnt/bucket"

[function.create-input]
invoke = ["test-py-api", "test-rank"]

[function.test-py-api]

[function.test-rank]
rank = 5
"#;

fn no_env(_: &str) -> Option<String> {
    None
}

fn write_config(contents: &str) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("Workflow.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn full_workflow_file_loads_with_defaults_filled_in() -> TestResult {
    let (_dir, path) = write_config(FULL_WORKFLOW)?;
    let cfg = load_and_validate_with_env(&path, no_env)?;

    assert_eq!(cfg.workflow.name, "IntegrationTestWorkflow");
    assert_eq!(cfg.invocation_id, "6f1c0e1a");
    assert_eq!(cfg.invocation_folder, "IntegrationTestWorkflow/6f1c0e1a");
    assert_eq!(cfg.store_root, PathBuf::from("/mnt/bucket"));

    assert_eq!(cfg.monitor.timeout_secs, 180);
    assert_eq!(cfg.monitor.check_interval_secs, 1);
    assert!(cfg.monitor.stream_logs);
    assert_eq!(cfg.function["test-rank"].rank, 5);
    assert_eq!(cfg.function["test-py-api"].rank, 1);
    assert!(cfg.function["test-py-api"].invoke.is_empty());

    let options = cfg.monitor.options();
    assert_eq!(options.timeout.as_secs(), 180);
    assert_eq!(options.log_poll_interval.as_secs(), 3);
    Ok(())
}

#[test]
fn environment_supplies_store_root_and_invocation_id() -> TestResult {
    let (_dir, path) = write_config(
        "[workflow]\nname = \"wf\"\nentrypoint = \"a\"\n\n[store]\nroot = \"/from/file\"\n\n[function.a]\n",
    )?;
    let raw = load_from_path(&path)?;
    assert!(raw.workflow.invocation_id.is_none());

    let cfg = load_and_validate_with_env(&path, |key| match key {
        k if k == STORE_ROOT_ENV => Some("/from/env".to_string()),
        k if k == INVOCATION_ID_ENV => Some("env-id".to_string()),
        _ => None,
    })?;

    assert_eq!(cfg.store_root, PathBuf::from("/from/env"));
    assert_eq!(cfg.invocation_id, "env-id");
    assert_eq!(cfg.invocation_folder, "wf/env-id");
    Ok(())
}

#[test]
fn file_invocation_id_wins_over_environment() -> TestResult {
    let (_dir, path) = write_config(FULL_WORKFLOW)?;
    let cfg = load_and_validate_with_env(&path, |key| {
        (key == INVOCATION_ID_ENV).then(|| "env-id".to_string())
    })?;

    assert_eq!(cfg.invocation_id, "6f1c0e1a");
    Ok(())
}

#[test]
fn missing_invocation_id_is_an_initialization_error() {
    let err = WorkflowFileBuilder::new("wf", "a")
        .function("a", &[])
        .invocation_id(None)
        .try_build()
        .expect_err("no invocation id");

    match err {
        DagpollError::Initialization(msg) => assert!(msg.contains(INVOCATION_ID_ENV)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_store_root_is_an_initialization_error() {
    let err = WorkflowFileBuilder::new("wf", "a")
        .function("a", &[])
        .store_root(None)
        .try_build()
        .expect_err("no store root");

    match err {
        DagpollError::Initialization(msg) => assert!(msg.contains("store root")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn config_without_functions_is_rejected() {
    let err = WorkflowFileBuilder::new("wf", "a")
        .try_build()
        .expect_err("no functions");

    assert!(matches!(err, DagpollError::ConfigError(_)));
}

#[test]
fn graph_errors_surface_from_validation() {
    let unknown = WorkflowFileBuilder::new("wf", "a")
        .function("a", &["ghost"])
        .try_build()
        .expect_err("unknown invoke target");
    assert!(matches!(unknown, DagpollError::UnknownFunction(_)));

    let cycle = WorkflowFileBuilder::new("wf", "a")
        .function("a", &["b"])
        .function("b", &["c"])
        .function("c", &["b"])
        .try_build()
        .expect_err("cycle");
    assert!(matches!(cycle, DagpollError::DagCycle(_)));

    let rank = WorkflowFileBuilder::new("wf", "a")
        .function("a", &["b"])
        .ranked_function("b", &[], 0)
        .try_build()
        .expect_err("rank 0");
    assert!(matches!(rank, DagpollError::Initialization(_)));
}

#[test]
fn zero_monitor_intervals_are_rejected() -> TestResult {
    let (_dir, path) = write_config(&FULL_WORKFLOW.replace("timeout_secs = 180", "timeout_secs = 0"))?;

    let err = load_and_validate_with_env(&path, no_env).expect_err("zero timeout");
    match err {
        DagpollError::ConfigError(msg) => assert!(msg.contains("timeout_secs")),
        other => return Err(format!("unexpected error: {other}").into()),
    }
    Ok(())
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let (_dir, path) = write_config("[workflow\nname = ")?;

    let err = load_from_path(&path).expect_err("bad toml");
    assert!(matches!(err, DagpollError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/definitely/not/here/Workflow.toml").expect_err("missing file");
    assert!(matches!(err, DagpollError::IoError(_)));
}
