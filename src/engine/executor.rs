// src/engine/executor.rs

//! Public entry point: run a DAG to completion on a bounded worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dag::node::{DagConfig, NodeIdentifier};
use crate::dag::Dag;
use crate::dataflow::ExecutionResultsReader;
use crate::engine::RuntimeEvent;
use crate::engine::core::CoreRuntime;
use crate::engine::observer::{ExecutionObserver, TracingObserver};
use crate::engine::report::ExecutionReport;
use crate::engine::runtime::Runtime;
use crate::errors::{Result, RundagError};
use crate::exec::runner::OperatorRunner;
use crate::exec::{ExecutorBackend, ThreadPoolBackend};
use crate::operator::OperatorRegistry;

/// Capacity of the completion channel between workers and the coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Executes DAGs. Keeps the wrappers of the last run so callers can read
/// per-node status and results afterwards.
pub struct DagExecutor {
    registry: OperatorRegistry,
    observer: Arc<dyn ExecutionObserver>,
    shutdown: CancellationToken,
    runners: HashMap<NodeIdentifier, OperatorRunner>,
}

impl std::fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagExecutor")
            .field("registry", &self.registry)
            .field("nodes", &self.runners.len())
            .finish_non_exhaustive()
    }
}

impl DagExecutor {
    pub fn new(registry: OperatorRegistry) -> Self {
        Self {
            registry,
            observer: Arc::new(TracingObserver),
            shutdown: CancellationToken::new(),
            runners: HashMap::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancelling this token aborts the current run (or the next one, if
    /// none is in progress): pending nodes end `NotRun` and running
    /// operators see their context cancelled.
    ///
    /// A token that aborted a run is replaced once that run returns, so
    /// fetch a fresh one before each run that needs it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run `dag` on a [`ThreadPoolBackend`] with `config.max_parallelism`
    /// workers. Returns once every node is terminal.
    pub async fn execute(&mut self, dag: &Dag, config: &DagConfig) -> Result<ExecutionReport> {
        let max_parallelism = config.max_parallelism;
        self.execute_with(dag, config, move |tx| ThreadPoolBackend::new(tx, max_parallelism))
            .await
    }

    /// Like [`execute`](Self::execute) with a caller-provided backend.
    ///
    /// `make_backend` receives the sender the backend must report
    /// completions on.
    pub async fn execute_with<E, F>(
        &mut self,
        dag: &Dag,
        config: &DagConfig,
        make_backend: F,
    ) -> Result<ExecutionReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        if dag.is_empty() {
            return Err(RundagError::EmptyDag);
        }
        dag.validate()?;

        let runners = dag
            .nodes()
            .map(|node| OperatorRunner::prepare(node, &self.registry))
            .collect::<Result<Vec<_>>>()?;

        info!(
            nodes = dag.len(),
            max_parallelism = config.max_parallelism,
            stop_at_failure = config.stop_at_failure,
            "executing DAG"
        );

        let started = Instant::now();
        let core = CoreRuntime::new(dag, runners, *config, Arc::clone(&self.observer));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let backend = make_backend(tx);
        let runtime = Runtime::new(core, rx, backend).with_shutdown(self.shutdown.clone());

        let outcome = runtime.run().await;
        if self.shutdown.is_cancelled() {
            debug!("shutdown token consumed by this run; installing a fresh one");
            self.shutdown = CancellationToken::new();
        }
        let core = outcome?;
        let report = core.report(started.elapsed());
        self.runners = core.into_runners();

        self.observer.on_run_finished(&report);
        Ok(report)
    }

    /// Final wrapper of a node from the last run.
    pub fn node(&self, id: &NodeIdentifier) -> Option<&OperatorRunner> {
        self.runners.get(id)
    }

    /// A fresh reader over a node's results from the last run.
    pub fn results_reader(&self, id: &NodeIdentifier) -> Option<ExecutionResultsReader> {
        self.runners.get(id)?.execution_results_reader()
    }
}
