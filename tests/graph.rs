// tests/graph.rs

use std::collections::HashMap;
use std::error::Error;

use dagpoll::dag::{InstanceId, WorkflowGraph};
use dagpoll::errors::DagpollError;
use dagpoll_test_utils::GraphBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn fan_out_graph() -> WorkflowGraph {
    GraphBuilder::new()
        .function("create-input", &["test-py-api", "test-r-api"])
        .function("test-py-api", &["sync"])
        .function("test-r-api", &["sync"])
        .function("sync", &["test-rank"])
        .function("test-rank", &[])
        .rank("test-rank", 3)
        .build()
}

#[test]
fn reverse_edges_mirror_forward_edges() {
    let graph = fan_out_graph();

    assert_eq!(graph.invokes("create-input"), ["test-py-api", "test-r-api"]);
    assert_eq!(graph.invokers("sync"), ["test-py-api", "test-r-api"]);
    assert_eq!(graph.invokers("test-rank"), ["sync"]);
    assert!(graph.invokers("create-input").is_empty());

    assert!(graph.is_root("create-input"));
    assert!(!graph.is_root("sync"));
    assert!(!graph.is_root("unknown"));
}

#[test]
fn ranked_functions_expand_into_numbered_instances() {
    let graph = fan_out_graph();

    let names: Vec<String> = graph.instances().iter().map(InstanceId::name).collect();
    assert_eq!(
        names,
        vec![
            "create-input",
            "test-py-api",
            "test-r-api",
            "sync",
            "test-rank(1)",
            "test-rank(2)",
            "test-rank(3)",
        ]
    );
    assert_eq!(graph.rank_of("test-rank"), Some(3));
    assert_eq!(graph.rank_of("sync"), Some(1));
    assert!(graph.instances_of("missing").is_empty());
}

#[test]
fn instance_names_parse_back() {
    let ranked = InstanceId::parse("test-rank(12)");
    assert_eq!(ranked.base(), "test-rank");
    assert_eq!(ranked.rank(), Some(12));
    assert_eq!(ranked.to_string(), "test-rank(12)");

    let single = InstanceId::parse("sync");
    assert_eq!(single, InstanceId::single("sync"));

    // Rank zero is not a valid rank suffix, so the whole name is the base.
    let odd = InstanceId::parse("weird(0)");
    assert_eq!(odd.base(), "weird(0)");
    assert_eq!(odd.rank(), None);

    assert_eq!(InstanceId::expand("f", 1), vec![InstanceId::single("f")]);
}

#[test]
fn duplicate_invocations_are_collapsed() {
    let graph = GraphBuilder::new()
        .function("a", &["b", "b"])
        .function("b", &[])
        .build();

    assert_eq!(graph.invokes("a"), ["b"]);
    assert_eq!(graph.invokers("b"), ["a"]);
}

#[test]
fn unknown_invoke_target_is_rejected() -> TestResult {
    let err = GraphBuilder::new()
        .function("a", &["ghost"])
        .try_build()
        .expect_err("unknown target should fail");

    match err {
        DagpollError::UnknownFunction(msg) => assert!(msg.contains("ghost")),
        other => return Err(format!("unexpected error: {other}").into()),
    }
    Ok(())
}

#[test]
fn self_invocation_is_rejected() {
    let err = GraphBuilder::new()
        .function("a", &["a"])
        .try_build()
        .expect_err("self invocation should fail");

    assert!(matches!(err, DagpollError::Initialization(_)));
}

#[test]
fn cycles_are_rejected() {
    let err = GraphBuilder::new()
        .function("a", &["b"])
        .function("b", &["c"])
        .function("c", &["b"])
        .try_build()
        .expect_err("cycle should fail");

    assert!(matches!(err, DagpollError::DagCycle(_)), "got {err}");
}

#[test]
fn zero_rank_is_rejected() {
    let err = GraphBuilder::new()
        .function("a", &[])
        .rank("a", 0)
        .try_build()
        .expect_err("rank 0 should fail");

    assert!(matches!(err, DagpollError::Initialization(_)));
}

#[test]
fn entrypoint_must_exist_and_have_no_invokers() {
    let unknown = GraphBuilder::new()
        .function("a", &[])
        .entrypoint("nope")
        .try_build()
        .expect_err("unknown entrypoint should fail");
    assert!(matches!(unknown, DagpollError::UnknownFunction(_)));

    let invoked = GraphBuilder::new()
        .function("a", &["b"])
        .function("b", &[])
        .entrypoint("b")
        .try_build()
        .expect_err("invoked entrypoint should fail");
    assert!(matches!(invoked, DagpollError::Initialization(_)));
}

#[test]
fn empty_graph_is_rejected() {
    let functions: Vec<(String, Vec<String>)> = Vec::new();
    let err = WorkflowGraph::new(functions, &HashMap::new(), "a").expect_err("empty graph");
    assert!(matches!(err, DagpollError::Initialization(_)));
}
