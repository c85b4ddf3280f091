// src/exec/runner.rs

//! Per-run node wrapper and the single operator invocation it performs.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::dag::node::{LogicalNode, NodeIdentifier};
use crate::dag::status::{ExecutionStatus, FailureKind, NodeOutcome, SkipCause};
use crate::dataflow::{ExecutionResults, ExecutionResultsReader};
use crate::errors::{Result, RundagError};
use crate::operator::{Operator, OperatorConfig, OperatorContext, OperatorRegistry};

/// Runtime wrapper around one logical node for one run.
///
/// Created by the executor for every node when a run is prepared. It holds
/// the readers of predecessors that finished, the node's current status,
/// and (on success) its results. Only the coordinator mutates it; the
/// operator itself runs on a worker with a [`ScheduledNode`] built from it.
pub struct OperatorRunner {
    logical_node: LogicalNode,
    /// `None` when initialization failed.
    operator: Option<Arc<dyn Operator>>,
    incoming: HashMap<NodeIdentifier, ExecutionResultsReader>,
    status: ExecutionStatus,
    failure: Option<FailureKind>,
    skip_cause: Option<SkipCause>,
    results: Option<Arc<ExecutionResults>>,
    elapsed: Option<Duration>,
}

impl std::fmt::Debug for OperatorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRunner")
            .field("node", self.logical_node.identifier())
            .field("status", &self.status)
            .field("failure", &self.failure)
            .field("inputs", &self.incoming.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OperatorRunner {
    /// Instantiate and initialize the node's operator.
    ///
    /// An unknown operator kind is a structural error and aborts the whole
    /// run before it starts. An error from `initialize` only affects this
    /// node: the wrapper is created already `Failed` and is never dispatched.
    pub fn prepare(node: &LogicalNode, registry: &OperatorRegistry) -> Result<Self> {
        let kind = &node.operator().kind;
        let mut operator = registry
            .create(kind)
            .ok_or_else(|| RundagError::UnknownOperator {
                node: node.identifier().to_string(),
                kind: kind.clone(),
            })?;

        let config = OperatorConfig {
            node: node.identifier().clone(),
            params: node.operator().params.clone(),
        };

        let mut runner = Self {
            logical_node: node.clone(),
            operator: None,
            incoming: HashMap::new(),
            status: ExecutionStatus::Running,
            failure: None,
            skip_cause: None,
            results: None,
            elapsed: None,
        };

        match operator.initialize(&config) {
            Ok(()) => runner.operator = Some(Arc::from(operator)),
            Err(e) => {
                warn!(node = %node.identifier(), kind = %kind, error = %e, "failed to initialize operator");
                runner.status = ExecutionStatus::Failed;
                runner.failure = Some(FailureKind::Initialization(format!("{e:#}")));
            }
        }

        Ok(runner)
    }

    pub fn identifier(&self) -> &NodeIdentifier {
        self.logical_node.identifier()
    }

    pub fn logical_node(&self) -> &LogicalNode {
        &self.logical_node
    }

    /// Sub-nodes of a composite node. Simple operators have none.
    pub fn physical_nodes(&self) -> &[LogicalNode] {
        &[]
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        self.failure.as_ref()
    }

    pub fn skip_cause(&self) -> Option<&SkipCause> {
        self.skip_cause.as_ref()
    }

    /// Wall time spent in the operator, if it ran.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn is_initialized(&self) -> bool {
        self.operator.is_some()
    }

    /// Register a finished predecessor's reader.
    pub fn add_input(&mut self, predecessor: NodeIdentifier, reader: ExecutionResultsReader) {
        self.incoming.insert(predecessor, reader);
    }

    pub fn incoming_readers(&self) -> &HashMap<NodeIdentifier, ExecutionResultsReader> {
        &self.incoming
    }

    /// A fresh reader over this node's results, if it succeeded.
    pub fn execution_results_reader(&self) -> Option<ExecutionResultsReader> {
        self.results.as_ref().map(ExecutionResults::reader)
    }

    pub fn execution_results(&self) -> Option<&Arc<ExecutionResults>> {
        self.results.as_ref()
    }

    /// Build the unit of work for a worker. `None` if the operator never
    /// initialized.
    pub fn schedule(&self, cancellation: CancellationToken) -> Option<ScheduledNode> {
        let operator = Arc::clone(self.operator.as_ref()?);
        let inputs = self
            .incoming
            .iter()
            .map(|(id, reader)| (id.clone(), Arc::clone(reader.results())))
            .collect();

        Some(ScheduledNode {
            identifier: self.identifier().clone(),
            skip_at_failure: self.logical_node.config().skip_at_failure,
            operator,
            context: OperatorContext::new(self.identifier().clone(), inputs, cancellation),
        })
    }

    /// Apply a worker's report.
    pub fn record(&mut self, report: NodeReport) {
        self.status = report.outcome.status();
        if let NodeOutcome::Skipped(cause) = report.outcome {
            self.skip_cause = Some(cause);
        }
        self.failure = report.failure;
        self.results = report.results;
        self.elapsed = report.elapsed;
    }

    /// Resolve a node the scheduler skipped because of `upstream`.
    pub fn mark_upstream_skipped(&mut self, upstream: NodeIdentifier) {
        self.status = ExecutionStatus::Skipped;
        self.skip_cause = Some(SkipCause::UpstreamFailure(upstream));
    }

    pub fn mark_not_run(&mut self) {
        self.status = ExecutionStatus::NotRun;
    }
}

/// Everything a worker needs to run one node, detached from the wrapper.
#[derive(Clone)]
pub struct ScheduledNode {
    pub identifier: NodeIdentifier,
    pub skip_at_failure: bool,
    pub operator: Arc<dyn Operator>,
    pub context: OperatorContext,
}

impl std::fmt::Debug for ScheduledNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledNode")
            .field("identifier", &self.identifier)
            .field("skip_at_failure", &self.skip_at_failure)
            .field("inputs", &self.context.inputs().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// What a worker reports back after running a node.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub outcome: NodeOutcome,
    pub failure: Option<FailureKind>,
    pub results: Option<Arc<ExecutionResults>>,
    pub elapsed: Option<Duration>,
}

impl NodeReport {
    /// Report for a node whose own attempt failed, honouring `skip_at_failure`.
    pub fn failed(failure: FailureKind, skip_at_failure: bool, elapsed: Option<Duration>) -> Self {
        let outcome = if skip_at_failure {
            NodeOutcome::Skipped(SkipCause::OwnFailure)
        } else {
            NodeOutcome::Failed
        };
        Self {
            outcome,
            failure: Some(failure),
            results: None,
            elapsed,
        }
    }
}

/// Invoke the node's operator exactly once.
///
/// Errors and panics are both caught and mapped to `Failed`, or to
/// `Skipped` when the node is configured with `skip_at_failure`.
pub fn run_operator(node: &ScheduledNode) -> NodeReport {
    let id = &node.identifier;
    debug!(node = %id, inputs = node.context.inputs().len(), "invoking operator");

    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| node.operator.run(&node.context)));
    let elapsed = Some(started.elapsed());

    let failure = match outcome {
        Ok(Ok(result)) => {
            let results = ExecutionResults::from((id.clone(), result));
            return NodeReport {
                outcome: NodeOutcome::Success,
                failure: None,
                results: Some(Arc::new(results)),
                elapsed,
            };
        }
        Ok(Err(e)) => FailureKind::Operator(format!("{e:#}")),
        Err(panic) => FailureKind::Panicked(panic_message(panic.as_ref())),
    };

    error!(node = %id, error = %failure, skip_at_failure = node.skip_at_failure, "failed to execute node");
    NodeReport::failed(failure, node.skip_at_failure, elapsed)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use serde_json::json;

    use super::*;
    use crate::dag::node::NodeConfig;
    use crate::dataflow::ExecutionResult;

    #[derive(Default)]
    struct Panicking;

    impl Operator for Panicking {
        fn run(&self, _ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
            panic!("kaboom");
        }
    }

    #[derive(Default)]
    struct BadInit;

    impl Operator for BadInit {
        fn initialize(&mut self, _config: &OperatorConfig) -> anyhow::Result<()> {
            Err(anyhow!("missing credentials"))
        }

        fn run(&self, _ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::new("k", json!(null)))
        }
    }

    fn registry() -> OperatorRegistry {
        let mut registry = OperatorRegistry::with_builtins();
        registry.register_default::<Panicking>("panic");
        registry.register_default::<BadInit>("bad-init");
        registry
    }

    fn run(node: LogicalNode) -> OperatorRunner {
        let mut runner = OperatorRunner::prepare(&node, &registry()).unwrap();
        let scheduled = runner.schedule(CancellationToken::new()).unwrap();
        let report = run_operator(&scheduled);
        runner.record(report);
        runner
    }

    #[test]
    fn successful_run_publishes_results() {
        let runner = run(LogicalNode::new("root", "log"));
        assert_eq!(runner.status(), ExecutionStatus::Success);

        let mut reader = runner.execution_results_reader().unwrap();
        assert_eq!(reader.next().unwrap().value(), &json!(["root"]));
        assert!(runner.elapsed().is_some());
    }

    #[test]
    fn failure_without_skip_is_failed() {
        let runner = run(LogicalNode::new("n", "fail"));
        assert_eq!(runner.status(), ExecutionStatus::Failed);
        assert!(matches!(runner.failure(), Some(FailureKind::Operator(_))));
        assert!(runner.execution_results_reader().is_none());
    }

    #[test]
    fn failure_with_skip_is_skipped() {
        let runner = run(
            LogicalNode::new("n", "fail").with_config(NodeConfig::default().skip_at_failure(true)),
        );
        assert_eq!(runner.status(), ExecutionStatus::Skipped);
        assert_eq!(runner.skip_cause(), Some(&SkipCause::OwnFailure));
    }

    #[test]
    fn panic_is_contained() {
        let runner = run(LogicalNode::new("n", "panic"));
        assert_eq!(runner.status(), ExecutionStatus::Failed);
        assert_eq!(
            runner.failure(),
            Some(&FailureKind::Panicked("kaboom".to_string()))
        );
    }

    #[test]
    fn init_failure_is_reported_distinctly() {
        let runner = OperatorRunner::prepare(&LogicalNode::new("n", "bad-init"), &registry()).unwrap();
        assert_eq!(runner.status(), ExecutionStatus::Failed);
        assert!(matches!(runner.failure(), Some(FailureKind::Initialization(msg)) if msg.contains("credentials")));
        assert!(runner.schedule(CancellationToken::new()).is_none());
    }

    #[test]
    fn unknown_kind_is_structural() {
        let err = OperatorRunner::prepare(&LogicalNode::new("n", "nope"), &registry()).unwrap_err();
        assert!(matches!(err, RundagError::UnknownOperator { kind, .. } if kind == "nope"));
    }

    #[test]
    fn physical_nodes_are_empty() {
        let runner = OperatorRunner::prepare(&LogicalNode::new("n", "log"), &registry()).unwrap();
        assert!(runner.physical_nodes().is_empty());
        assert_eq!(runner.logical_node().identifier().name(), "n");
    }
}
