// src/lib.rs

//! `rundag` executes a directed acyclic graph of operators exactly once per
//! run: a node is dispatched as soon as all of its predecessors are
//! terminal, its operator receives the predecessors' results, and failures
//! are contained according to per-node and graph-wide policy.

pub mod cli;
pub mod config;
pub mod dag;
pub mod dataflow;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fetch;
pub mod logging;
pub mod operator;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{Dag, DagConfig, ExecutionStatus};
use crate::engine::{DagExecutor, ExecutionReport};
use crate::operator::OperatorRegistry;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, builds the DAG and runs it once with the
/// built-in operators. Ctrl-C aborts the run: nodes not yet dispatched end
/// `NotRun`, running commands are killed.
///
/// Returns `Ok(true)` if every node succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let dag = Dag::from_config(&cfg)?;
    let policy = effective_policy(&cfg, &args);

    if args.dry_run {
        print_dry_run(&cfg, &dag, &policy)?;
        return Ok(true);
    }

    let mut executor = DagExecutor::new(OperatorRegistry::with_builtins());

    let shutdown = executor.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received");
        shutdown.cancel();
    });

    let report = executor.execute(&dag, &policy).await?;
    print_summary(&report);

    Ok(report.is_success())
}

/// `[config]` values, overridden by CLI flags.
fn effective_policy(cfg: &ConfigFile, args: &CliArgs) -> DagConfig {
    let mut policy = cfg.dag_config();
    if args.stop_at_failure {
        policy = policy.stop_at_failure(true);
    }
    if let Some(n) = args.max_parallelism {
        policy = policy.max_parallelism(n as usize);
    }
    policy
}

/// Print nodes in a valid execution order with their dependencies.
fn print_dry_run(cfg: &ConfigFile, dag: &Dag, policy: &DagConfig) -> Result<()> {
    println!("rundag dry-run");
    println!("  config.stop_at_failure = {}", policy.stop_at_failure);
    println!("  config.max_parallelism = {}", policy.max_parallelism);
    println!();

    let order = dag.topological_order()?;
    println!("nodes ({}), in execution order:", order.len());
    for id in order.iter() {
        let Some(section) = cfg.node(id.name()) else {
            continue;
        };
        println!("  - {id}");
        println!("      operator: {}", section.operator);
        if !section.after.is_empty() {
            println!("      after: {:?}", section.after);
        }
        if section.skip_at_failure {
            println!("      skip_at_failure: true");
        }
        if !section.params.is_null() {
            println!("      params: {}", section.params);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(report: &ExecutionReport) {
    println!("rundag: {} node(s) in {:.2?}", report.statuses().len(), report.elapsed());
    for (id, status) in report.statuses() {
        println!("  {status:<8} {id}");
    }

    for status in [
        ExecutionStatus::Failed,
        ExecutionStatus::Skipped,
        ExecutionStatus::NotRun,
    ] {
        let nodes = report.nodes_with(status);
        if !nodes.is_empty() {
            info!(%status, count = nodes.len(), "nodes did not succeed");
        }
    }
}
