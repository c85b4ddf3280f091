// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (scheduler bookkeeping, node wrappers)
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from the channel, handing `ScheduledNode`s to the executor
//! backend and turning Ctrl-C into an abort.
//!
//! The core is unit tested without Tokio, channels or worker threads.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dag::node::{DagConfig, NodeIdentifier};
use crate::dag::{Dag, Scheduler};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_abort, handle_node_finished, handle_start,
};
use crate::engine::observer::{ExecutionObserver, TracingObserver};
use crate::engine::report::ExecutionReport;
use crate::exec::runner::OperatorRunner;

/// Pure core runtime state for one run.
///
/// This owns:
/// - the DAG scheduler
/// - one [`OperatorRunner`] per node
/// - the graph-wide policy and the run's cancellation token
///
/// It performs no IO. The only thread-safe handle it shares is the
/// cancellation token, which it cancels on an external abort request.
/// `stop_at_failure` only halts new dispatch and leaves the token alone.
pub struct CoreRuntime {
    pub(super) scheduler: Scheduler,
    pub(super) runners: HashMap<NodeIdentifier, OperatorRunner>,
    pub(super) successors: HashMap<NodeIdentifier, Vec<NodeIdentifier>>,
    pub(super) order: Vec<NodeIdentifier>,
    pub(super) config: DagConfig,
    pub(super) cancellation: CancellationToken,
    pub(super) observer: Arc<dyn ExecutionObserver>,
}

impl fmt::Debug for CoreRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreRuntime")
            .field("config", &self.config)
            .field("nodes", &self.order)
            .field("in_flight", &self.scheduler.in_flight())
            .field("aborted", &self.scheduler.is_aborted())
            .finish_non_exhaustive()
    }
}

impl CoreRuntime {
    /// Build the core for one run of `dag`. `runners` must hold exactly one
    /// prepared wrapper per node.
    pub fn new(
        dag: &Dag,
        runners: Vec<OperatorRunner>,
        config: DagConfig,
        observer: Arc<dyn ExecutionObserver>,
    ) -> Self {
        let order: Vec<NodeIdentifier> = dag.nodes().map(|n| n.identifier().clone()).collect();
        let successors = order
            .iter()
            .map(|id| (id.clone(), dag.successors_of(id).to_vec()))
            .collect();
        let runners = runners
            .into_iter()
            .map(|r| (r.identifier().clone(), r))
            .collect();

        Self {
            scheduler: Scheduler::new(dag),
            runners,
            successors,
            order,
            config,
            cancellation: CancellationToken::new(),
            observer,
        }
    }

    /// Same as [`new`](Self::new) with a [`TracingObserver`].
    pub fn with_tracing(dag: &Dag, runners: Vec<OperatorRunner>, config: DagConfig) -> Self {
        Self::new(dag, runners, config, Arc::new(TracingObserver))
    }

    /// Resolve initialization failures and dispatch the roots.
    pub fn start(&mut self) -> CoreStep {
        handle_start(self)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::NodeFinished { node, report } => {
                handle_node_finished(self, node, report)
            }
            RuntimeEvent::AbortRequested => handle_abort(self),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn is_aborted(&self) -> bool {
        self.scheduler.is_aborted()
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn runner(&self, id: &NodeIdentifier) -> Option<&OperatorRunner> {
        self.runners.get(id)
    }

    /// Token handed to every dispatched operator.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn observer(&self) -> &Arc<dyn ExecutionObserver> {
        &self.observer
    }

    /// Snapshot of every node's current status.
    pub fn report(&self, elapsed: Duration) -> ExecutionReport {
        let statuses: BTreeMap<_, _> = self
            .runners
            .iter()
            .map(|(id, r)| (id.clone(), r.status()))
            .collect();
        ExecutionReport::new(statuses, elapsed)
    }

    /// Hand the wrappers back once the run is over.
    pub fn into_runners(self) -> HashMap<NodeIdentifier, OperatorRunner> {
        self.runners
    }
}
