// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod logs;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::WorkflowFile;
use crate::dag::WorkflowGraph;
use crate::engine::{
    InterruptOutcome, StatusChange, StatusSnapshot, WorkflowMonitor, handle_interrupts,
};

/// Exit code used when a second interrupt escalates.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (plus CLI overrides)
/// - the invocation graph and the directory-backed store
/// - the workflow monitor and its log monitors
/// - Ctrl-C handling
///
/// Returns whether every instance ended COMPLETED or NOT_INVOKED.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;
    apply_cli_overrides(&mut cfg, &args);

    if args.dry_run {
        let graph = WorkflowGraph::from_config(&cfg)?;
        print_dry_run(&cfg, &graph);
        return Ok(true);
    }

    let monitor = WorkflowMonitor::from_config(&cfg)?;
    // Subscribe before starting so the first tick is reported too.
    let mut changes = monitor.subscribe();
    monitor.start()?;
    info!(
        workflow = %monitor.workflow_name(),
        invocation_id = %monitor.invocation_id(),
        "monitoring workflow"
    );

    // Ctrl-C → graceful shutdown; a second Ctrl-C exits right away.
    {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let outcome = handle_interrupts(monitor, || async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            })
            .await;

            if outcome == InterruptOutcome::Escalate {
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
        });
    }

    let finished = monitor.wait_until_complete();
    tokio::pin!(finished);
    loop {
        tokio::select! {
            biased;
            change = changes.recv() => match change {
                Ok(change) => print_change(&change),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "status report fell behind; some changes were not printed");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut finished => break,
        }
    }
    // Changes published right before completion was signalled.
    loop {
        match changes.try_recv() {
            Ok(change) => print_change(&change),
            Err(TryRecvError::Lagged(missed)) => {
                warn!(missed, "status report fell behind; some changes were not printed");
            }
            Err(_) => break,
        }
    }

    monitor.cleanup().await;

    let final_statuses = monitor.get_statuses();
    print_final(&final_statuses);

    Ok(final_statuses.succeeded())
}

fn apply_cli_overrides(cfg: &mut WorkflowFile, args: &CliArgs) {
    if let Some(timeout) = args.timeout {
        cfg.monitor.timeout_secs = timeout;
    }
    if let Some(interval) = args.check_interval {
        cfg.monitor.check_interval_secs = interval;
    }
    if args.stream_logs {
        cfg.monitor.stream_logs = true;
    }
}

fn print_change(change: &StatusChange) {
    println!("  {}: {} -> {}", change.instance, change.from, change.to);
}

fn print_final(statuses: &StatusSnapshot) {
    println!();
    println!("Final results:");
    for (name, status) in statuses.iter() {
        println!("  {name}: {status}");
    }

    if statuses.succeeded() {
        println!("\nAll functions completed successfully");
    } else {
        println!("\nSome functions failed, were skipped or timed out");
    }
}

/// Simple dry-run output: print settings, instances and invokers.
fn print_dry_run(cfg: &WorkflowFile, graph: &WorkflowGraph) {
    println!("dagpoll dry-run");
    println!("  workflow = {}", cfg.workflow.name);
    println!("  entrypoint = {}", cfg.workflow.entrypoint);
    println!("  invocation_id = {}", cfg.invocation_id);
    println!("  invocation_folder = {}", cfg.invocation_folder);
    println!("  store.root = {}", cfg.store_root.display());
    println!("  monitor.check_interval_secs = {}", cfg.monitor.check_interval_secs);
    println!("  monitor.timeout_secs = {}", cfg.monitor.timeout_secs);
    println!("  monitor.stream_logs = {}", cfg.monitor.stream_logs);
    println!();

    println!("functions ({}):", cfg.function.len());
    for name in graph.functions() {
        println!("  - {name}");
        let instances: Vec<String> = graph.instances_of(name).iter().map(|i| i.name()).collect();
        if instances.len() > 1 {
            println!("      instances: {instances:?}");
        }
        if !graph.invokes(name).is_empty() {
            println!("      invokes: {:?}", graph.invokes(name));
        }
        if !graph.invokers(name).is_empty() {
            println!("      invoked_by: {:?}", graph.invokers(name));
        }
    }

    debug!("dry-run complete (no monitoring)");
}
