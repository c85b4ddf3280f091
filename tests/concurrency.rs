// tests/concurrency.rs

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rundag::dag::{DagConfig, ExecutionStatus};
use rundag::engine::DagExecutor;
use rundag::operator::OperatorRegistry;
use rundag_test_utils::builders::DagBuilder;
use rundag_test_utils::operators::{Concurrency, register_hold, test_registry};
use rundag_test_utils::{init_tracing, with_timeout};
use serde_json::json;

use crate::common::run_dag;

fn hold_registry(hold: Duration) -> (OperatorRegistry, Arc<Concurrency>) {
    let concurrency = Arc::new(Concurrency::default());
    let mut registry = OperatorRegistry::with_builtins();
    register_hold(&mut registry, concurrency.clone(), hold);
    (registry, concurrency)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_pool_bounds_parallelism() {
    init_tracing();
    let (registry, concurrency) = hold_registry(Duration::from_millis(40));

    let mut builder = DagBuilder::new();
    for i in 0..8 {
        builder = builder.node_with(&format!("p{i}"), "hold");
    }
    let dag = builder.build();

    let run = run_dag(&dag, DagConfig::default().max_parallelism(2), registry).await;

    assert!(run.report.is_success());
    assert_eq!(concurrency.total(), 8);
    assert!(concurrency.peak() <= 2, "peak was {}", concurrency.peak());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_branches_run_in_parallel() {
    init_tracing();
    let (registry, concurrency) = hold_registry(Duration::from_millis(150));

    let dag = DagBuilder::new()
        .node_with("left", "hold")
        .node_with("right", "hold")
        .build();

    let started = Instant::now();
    let run = run_dag(&dag, DagConfig::default().max_parallelism(2), registry).await;

    assert!(run.report.is_success());
    assert_eq!(concurrency.peak(), 2);
    assert!(started.elapsed() < Duration::from_millis(290));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wide_fan_in_is_dispatched_once() {
    init_tracing();
    let (registry, concurrency) = hold_registry(Duration::from_millis(5));

    let mut builder = DagBuilder::new().node_with("sink", "hold");
    for i in 0..32 {
        let name = format!("src{i}");
        builder = builder.node_with(&name, "hold").edge(&name, "sink");
    }
    let dag = builder.build();

    let run = run_dag(&dag, DagConfig::default().max_parallelism(8), registry).await;

    assert!(run.report.is_success());
    assert_eq!(concurrency.total(), 33);

    let dispatched = run.observer.dispatched();
    assert_eq!(dispatched.len(), 33);
    assert_eq!(dispatched.iter().filter(|n| *n == "sink").count(), 1);
    assert_eq!(dispatched.last().map(String::as_str), Some("sink"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_at_failure_halts_new_dispatch() {
    init_tracing();
    let (registry, _concurrency) = hold_registry(Duration::from_millis(100));

    // `fails` is a root; `slow` is already running when it fails and is
    // allowed to finish; `after_slow` must never start.
    let dag = DagBuilder::new()
        .node_with("fails", "fail")
        .node_with("slow", "hold")
        .node("after_slow")
        .edge("slow", "after_slow")
        .build();

    let run = run_dag(
        &dag,
        DagConfig::default().max_parallelism(4).stop_at_failure(true),
        registry,
    )
    .await;

    assert_eq!(run.report.status(&"fails".into()), Some(ExecutionStatus::Failed));
    assert_eq!(run.report.status(&"slow".into()), Some(ExecutionStatus::Success));
    assert_eq!(run.report.status(&"after_slow".into()), Some(ExecutionStatus::NotRun));
    assert!(!run.observer.dispatched().contains(&"after_slow".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn without_stop_at_failure_other_branches_complete() {
    init_tracing();
    let (registry, _concurrency) = hold_registry(Duration::from_millis(20));

    let dag = DagBuilder::new()
        .node_with("fails", "fail")
        .node_with("slow", "hold")
        .node("after_slow")
        .edge("slow", "after_slow")
        .build();

    let run = run_dag(&dag, DagConfig::default().max_parallelism(4), registry).await;

    assert_eq!(run.report.status(&"after_slow".into()), Some(ExecutionStatus::Success));
    assert_eq!(run.report.count(ExecutionStatus::NotRun), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_token_aborts_and_cancels_running_operators() {
    init_tracing();
    let dag = DagBuilder::new()
        .node_with("waits", "wait_for_cancel")
        .node("never")
        .edge("waits", "never")
        .build();

    let mut executor = DagExecutor::new(test_registry());
    let shutdown = executor.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let report = with_timeout(executor.execute(&dag, &DagConfig::default().max_parallelism(2)))
        .await
        .unwrap();

    assert_eq!(report.status(&"waits".into()), Some(ExecutionStatus::Failed));
    assert_eq!(report.status(&"never".into()), Some(ExecutionStatus::NotRun));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_at_failure_lets_running_command_finish() {
    init_tracing();
    let dag = DagBuilder::new()
        .node_with("fails", "fail")
        .node_with_params("inflight", "command", json!({ "cmd": "sleep 0.5; echo done" }))
        .node("after_inflight")
        .edge("inflight", "after_inflight")
        .build();

    let mut executor = DagExecutor::new(OperatorRegistry::with_builtins());
    let report = with_timeout(executor.execute(
        &dag,
        &DagConfig::default().max_parallelism(2).stop_at_failure(true),
    ))
    .await
    .unwrap();

    assert_eq!(report.status(&"fails".into()), Some(ExecutionStatus::Failed));
    assert_eq!(report.status(&"inflight".into()), Some(ExecutionStatus::Success));
    assert_eq!(report.status(&"after_inflight".into()), Some(ExecutionStatus::NotRun));

    let stdout: Vec<_> = executor.results_reader(&"inflight".into()).unwrap().collect();
    assert_eq!(stdout[0].value(), &json!("done"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_kills_running_command() {
    init_tracing();
    let dag = DagBuilder::new()
        .node_with_params("sleeper", "command", json!({ "cmd": "sleep 30" }))
        .build();

    let mut executor = DagExecutor::new(OperatorRegistry::with_builtins());
    let shutdown = executor.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
    });

    let started = Instant::now();
    let report = with_timeout(executor.execute(&dag, &DagConfig::default().max_parallelism(2)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.status(&"sleeper".into()), Some(ExecutionStatus::Failed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn executor_runs_again_after_shutdown() {
    init_tracing();
    let dag = DagBuilder::new().node("a").node("b").edge("a", "b").build();

    let mut executor = DagExecutor::new(test_registry());
    executor.shutdown_token().cancel();
    let first = with_timeout(executor.execute(&dag, &DagConfig::default()))
        .await
        .unwrap();
    assert!(!first.is_success());

    let second = with_timeout(executor.execute(&dag, &DagConfig::default()))
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.status(&"b".into()), Some(ExecutionStatus::Success));
}
