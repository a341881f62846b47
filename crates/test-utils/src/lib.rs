pub mod builders;
pub mod fake_execution;

use std::sync::Once;
use std::time::Duration;

use dagpoll::engine::MonitorOptions;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{GraphBuilder, WorkflowFileBuilder};
pub use fake_execution::FakeExecution;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
///
/// On a paused clock this bounds virtual time, not wall time.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Run a future with an explicit timeout.
pub async fn with_timeout_secs<F, T>(secs: u64, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(secs), f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {secs} seconds"))
}

/// Monitor options for tests: one-second ticks, a ten-second inactivity
/// timeout and one-second log polls.
pub fn test_options() -> MonitorOptions {
    MonitorOptions {
        check_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(10),
        stream_logs: false,
        log_poll_interval: Duration::from_secs(1),
        shutdown_timeout: Duration::from_secs(5),
    }
}
