// src/engine/observer.rs

//! Hooks for watching a run from the outside.
//!
//! The executor is handed an observer instead of reaching for a global
//! logger, so tests can record exactly what the coordinator did.

use tracing::{debug, info, warn};

use crate::dag::node::NodeIdentifier;
use crate::dag::status::ExecutionStatus;
use crate::engine::report::ExecutionReport;

/// Callbacks invoked by the coordinator, in the order it acts.
///
/// All methods default to no-ops. They are called from the coordinator
/// only, never from workers, so `on_node_finished` for a node always
/// precedes `on_node_dispatched` for any of its successors.
pub trait ExecutionObserver: Send + Sync {
    fn on_run_started(&self, _nodes: usize) {}

    fn on_node_dispatched(&self, _node: &NodeIdentifier) {}

    fn on_node_finished(&self, _node: &NodeIdentifier, _status: ExecutionStatus) {}

    fn on_run_finished(&self, _report: &ExecutionReport) {}
}

/// Default observer: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_run_started(&self, nodes: usize) {
        info!(nodes, "DAG run started");
    }

    fn on_node_dispatched(&self, node: &NodeIdentifier) {
        debug!(node = %node, "node dispatched");
    }

    fn on_node_finished(&self, node: &NodeIdentifier, status: ExecutionStatus) {
        match status {
            ExecutionStatus::Success => info!(node = %node, %status, "node finished"),
            _ => warn!(node = %node, %status, "node finished"),
        }
    }

    fn on_run_finished(&self, report: &ExecutionReport) {
        info!(
            succeeded = report.count(ExecutionStatus::Success),
            failed = report.count(ExecutionStatus::Failed),
            skipped = report.count(ExecutionStatus::Skipped),
            not_run = report.count(ExecutionStatus::NotRun),
            elapsed_ms = report.elapsed().as_millis() as u64,
            "DAG run finished"
        );
    }
}
