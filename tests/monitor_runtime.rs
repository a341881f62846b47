// tests/monitor_runtime.rs

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dagpoll::dag::InstanceId;
use dagpoll::engine::probe::ProbeFuture;
use dagpoll::engine::{InvocationProbe, MonitorOptions, Observation, WorkflowMonitor};
use dagpoll::errors::DagpollError;
use dagpoll::store::MemoryStore;
use dagpoll::types::FunctionStatus;
use dagpoll_test_utils::{GraphBuilder, init_tracing, test_options, with_timeout_secs};
use tokio::time::{Instant, sleep};

use common::{default_monitor, drain, monitor_with};

type TestResult = Result<(), Box<dyn Error>>;

/// Observer that takes `delay` per instance before reporting it running, so a
/// tick can be caught in flight.
#[derive(Debug)]
struct DelayedRunning {
    delay: Duration,
}

impl InvocationProbe for DelayedRunning {
    fn observe<'a>(&'a self, _instance: &'a InstanceId) -> ProbeFuture<'a> {
        Box::pin(async move {
            sleep(self.delay).await;
            Ok(Observation::Running)
        })
    }
}

fn chain() -> dagpoll::dag::WorkflowGraph {
    GraphBuilder::new()
        .function("A", &["B"])
        .function("B", &["C"])
        .function("C", &[])
        .build()
}

#[tokio::test(start_paused = true)]
async fn monitor_follows_a_chain_to_completion() -> TestResult {
    init_tracing();

    let (monitor, exec) = default_monitor(chain());
    exec.start("A");
    exec.complete("A", &["B"]);
    exec.start("B");
    exec.complete("B", &[]);

    monitor.start()?;
    let statuses = with_timeout_secs(30, monitor.wait_until_complete()).await;

    assert_eq!(statuses.get("A"), Some(FunctionStatus::Completed));
    assert_eq!(statuses.get("B"), Some(FunctionStatus::Completed));
    assert_eq!(statuses.get("C"), Some(FunctionStatus::NotInvoked));
    assert!(statuses.succeeded());
    assert!(monitor.is_complete());
    assert!(monitor.shutdown(None).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ranked_instances_are_monitored_individually() -> TestResult {
    let graph = GraphBuilder::new()
        .function("create-input", &["test-rank"])
        .function("test-rank", &[])
        .rank("test-rank", 3)
        .build();
    let (monitor, exec) = default_monitor(graph);

    exec.complete("create-input", &["test-rank"]);
    for rank in 1..=3 {
        exec.complete(&format!("test-rank({rank})"), &[]);
    }

    monitor.start()?;
    let statuses = with_timeout_secs(30, monitor.wait_until_complete()).await;

    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses.get("test-rank(2)"), Some(FunctionStatus::Completed));
    assert!(statuses.succeeded());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_changes_are_broadcast_in_commit_order() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    let mut rx = monitor.subscribe();

    exec.start("A");
    monitor.start()?;
    sleep(Duration::from_secs(2)).await;

    exec.complete("A", &[]);
    with_timeout_secs(30, monitor.wait_until_complete()).await;

    let changes: Vec<(String, FunctionStatus)> = drain(&mut rx)
        .into_iter()
        .map(|c| (c.instance, c.to))
        .collect();
    assert_eq!(
        changes,
        vec![
            ("A".to_string(), FunctionStatus::Running),
            ("A".to_string(), FunctionStatus::Completed),
            ("B".to_string(), FunctionStatus::NotInvoked),
            ("C".to_string(), FunctionStatus::NotInvoked),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_instance_ends_the_run() -> TestResult {
    let graph = GraphBuilder::new()
        .function("A", &["C"])
        .function("B", &["C"])
        .function("C", &[])
        .build();
    let (monitor, exec) = default_monitor(graph);

    exec.start("B");
    monitor.start()?;
    sleep(Duration::from_secs(2)).await;
    exec.fail("A");

    let statuses = with_timeout_secs(30, monitor.wait_until_complete()).await;

    assert_eq!(statuses.get("A"), Some(FunctionStatus::Failed));
    assert_eq!(statuses.get("B"), Some(FunctionStatus::Skipped));
    assert_eq!(statuses.get("C"), Some(FunctionStatus::Skipped));
    assert!(!statuses.succeeded());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inactivity_times_out_unfinished_instances() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    exec.complete("A", &["B"]);

    let started = Instant::now();
    monitor.start()?;
    let statuses = with_timeout_secs(60, monitor.wait_until_complete()).await;

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(statuses.get("A"), Some(FunctionStatus::Completed));
    assert_eq!(statuses.get("B"), Some(FunctionStatus::Timeout));
    assert_eq!(statuses.get("C"), Some(FunctionStatus::Timeout));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn steady_progress_outlives_the_inactivity_timeout() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    monitor.start()?;

    // Each step lands well within the 10s timeout, the whole run does not.
    sleep(Duration::from_secs(6)).await;
    exec.start("A");
    sleep(Duration::from_secs(6)).await;
    exec.complete("A", &["B"]);
    sleep(Duration::from_secs(6)).await;
    exec.complete("B", &["C"]);
    sleep(Duration::from_secs(6)).await;
    exec.complete("C", &[]);

    let statuses = with_timeout_secs(60, monitor.wait_until_complete()).await;
    assert!(statuses.succeeded(), "statuses: {statuses:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn store_errors_are_retried_on_the_next_tick() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    exec.complete("A", &[]);
    exec.store().fail_next(3);

    monitor.start()?;
    let statuses = with_timeout_secs(30, monitor.wait_until_complete()).await;

    assert!(statuses.succeeded());
    assert_eq!(statuses.get("A"), Some(FunctionStatus::Completed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_store_errors_count_toward_the_timeout() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    exec.complete("A", &["B"]);
    exec.store().fail_next(usize::MAX);

    monitor.start()?;
    let statuses = with_timeout_secs(60, monitor.wait_until_complete()).await;

    assert_eq!(statuses.get("A"), Some(FunctionStatus::Timeout));
    assert_eq!(statuses.get("B"), Some(FunctionStatus::Timeout));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_skips_unfinished_instances() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    exec.start("A");

    monitor.start()?;
    sleep(Duration::from_secs(3)).await;
    assert_eq!(monitor.status_of("A"), Some(FunctionStatus::Running));

    assert!(monitor.shutdown(Some(Duration::from_secs(5))).await);
    assert!(monitor.is_complete());
    assert!(monitor.is_shutdown_requested());

    let statuses = monitor.get_statuses();
    assert!(
        statuses
            .iter()
            .all(|(_, status)| status == FunctionStatus::Skipped),
        "statuses: {statuses:?}"
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_start_settles_the_table() -> TestResult {
    let (monitor, _exec) = default_monitor(chain());

    assert!(monitor.shutdown(None).await);
    assert!(monitor.is_complete());
    assert_eq!(monitor.status_of("A"), Some(FunctionStatus::Skipped));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn force_shutdown_latches_without_waiting() -> TestResult {
    let (monitor, _exec) = default_monitor(chain());
    monitor.start()?;
    sleep(Duration::from_secs(2)).await;

    monitor.force_shutdown();
    assert!(monitor.is_complete());
    assert_eq!(monitor.status_of("B"), Some(FunctionStatus::Skipped));

    // The loop notices on its own and later joins cleanly.
    assert!(monitor.cleanup().await);
    assert_eq!(monitor.status_of("B"), Some(FunctionStatus::Skipped));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wait_for_returns_first_final_status() -> TestResult {
    let (monitor, exec) = default_monitor(chain());
    monitor.start()?;

    let writer = {
        let exec = exec.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            exec.complete("A", &["B"]);
        })
    };

    let status = with_timeout_secs(30, monitor.wait_for("A")).await?;
    assert_eq!(status, FunctionStatus::Completed);
    writer.await?;

    let err = monitor.wait_for("nope").await.expect_err("unknown instance");
    assert!(matches!(err, DagpollError::UnknownFunction(_)));

    monitor.cleanup().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn starting_twice_is_rejected() -> TestResult {
    let (monitor, _exec) = default_monitor(chain());
    monitor.start()?;

    let err = monitor.start().expect_err("second start");
    assert!(matches!(err, DagpollError::AlreadyStarted));

    monitor.cleanup().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn accessors_describe_the_run() -> TestResult {
    let (monitor, _exec) = default_monitor(chain());

    assert_eq!(monitor.workflow_name(), "wf");
    assert_eq!(monitor.invocation_id(), "inv-1");
    assert_eq!(monitor.invocation_folder(), common::FOLDER);
    assert_eq!(monitor.instances(), ["A", "B", "C"]);
    assert!(!monitor.is_started());
    assert_eq!(monitor.get_statuses().len(), 3);
    Ok(())
}

#[test]
fn zero_intervals_are_rejected_at_build_time() {
    let mut options = test_options();
    options.check_interval = Duration::ZERO;

    let err = WorkflowMonitor::builder(chain(), Arc::new(MemoryStore::new()))
        .invocation_id("inv-1")
        .options(options)
        .build()
        .expect_err("zero check interval");
    assert!(matches!(err, DagpollError::Initialization(_)));
}

#[test]
fn missing_invocation_id_is_an_initialization_error() {
    let err = WorkflowMonitor::builder(chain(), Arc::new(MemoryStore::new()))
        .build()
        .expect_err("no invocation id or folder");
    assert!(matches!(err, DagpollError::Initialization(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_shutdowns_both_wait_for_the_loop() -> TestResult {
    let monitor = WorkflowMonitor::builder(chain(), Arc::new(MemoryStore::new()))
        .workflow_name("wf")
        .invocation_id("inv-1")
        .options(test_options())
        .probe(Arc::new(DelayedRunning {
            delay: Duration::from_secs(2),
        }))
        .build()?;
    monitor.start()?;

    // The loop is now inside its first (slow) observation.
    sleep(Duration::from_millis(500)).await;

    let first = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.shutdown(Some(Duration::from_secs(10))).await })
    };
    sleep(Duration::from_millis(10)).await;
    assert!(!monitor.is_complete());

    let second = with_timeout_secs(30, monitor.shutdown(Some(Duration::from_secs(10)))).await;
    assert!(second, "second caller should wait for the loop to stop");
    assert!(monitor.is_complete());

    assert!(with_timeout_secs(30, first).await?);
    assert_eq!(monitor.status_of("A"), Some(FunctionStatus::Skipped));
    assert_eq!(monitor.status_of("C"), Some(FunctionStatus::Skipped));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_shutdown_reports_a_loop_that_outlives_its_timeout() -> TestResult {
    let monitor = WorkflowMonitor::builder(chain(), Arc::new(MemoryStore::new()))
        .workflow_name("wf")
        .invocation_id("inv-1")
        .options(test_options())
        .probe(Arc::new(DelayedRunning {
            delay: Duration::from_secs(20),
        }))
        .build()?;
    monitor.start()?;
    sleep(Duration::from_millis(500)).await;

    let first = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.shutdown(Some(Duration::from_secs(60))).await })
    };
    sleep(Duration::from_millis(10)).await;

    assert!(!monitor.shutdown(Some(Duration::from_secs(1))).await);
    assert!(!monitor.is_complete());

    assert!(with_timeout_secs(90, first).await?);
    assert!(monitor.is_complete());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_logs_follows_every_instance() -> TestResult {
    let graph = GraphBuilder::new()
        .function("A", &["B"])
        .function("B", &[])
        .build();
    let options = MonitorOptions {
        stream_logs: true,
        ..test_options()
    };
    let (monitor, exec) = monitor_with(graph, options);

    exec.log("A", "a1");
    exec.complete("A", &["B"]);
    exec.log("B", "b1");
    exec.log("B", "b2");
    exec.complete("B", &[]);

    monitor.start()?;
    let statuses = with_timeout_secs(30, monitor.wait_until_complete()).await;
    assert!(statuses.succeeded());

    assert!(with_timeout_secs(30, monitor.cleanup()).await);
    assert_eq!(monitor.log_lines("A"), Some(vec!["a1".to_string()]));
    assert_eq!(
        monitor.log_lines("B"),
        Some(vec!["b1".to_string(), "b2".to_string()])
    );
    for name in ["A", "B"] {
        let log = monitor.log_monitor(name).ok_or("log monitor missing")?;
        assert!(log.is_complete(), "{name} log monitor should have completed");
        assert!(!log.is_running());
    }
    Ok(())
}
