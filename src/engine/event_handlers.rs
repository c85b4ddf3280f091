// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::dag::node::NodeIdentifier;
use crate::dag::status::{ExecutionStatus, FailureKind, NodeOutcome, SkipCause};
use crate::dag::SchedulerStep;
use crate::engine::core::CoreRuntime;
use crate::exec::runner::{NodeReport, ScheduledNode};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these nodes to the executor backend.
    Dispatch(Vec<ScheduledNode>),
    /// Every node is terminal; the run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Seed the run: resolve nodes whose operator failed to initialize, then
/// claim and dispatch the roots.
pub fn handle_start(core: &mut CoreRuntime) -> CoreStep {
    let mut dispatch = Vec::new();
    let mut pending = VecDeque::new();

    core.observer.on_run_started(core.runners.len());

    let init_failed: Vec<NodeIdentifier> = core
        .order
        .iter()
        .filter(|id| core.runners.get(*id).is_some_and(|r| !r.is_initialized()))
        .cloned()
        .collect();

    // Every init failure is recorded before a possible abort so none of
    // them is later resolved as `NotRun`.
    let any_init_failed = !init_failed.is_empty();
    for id in init_failed {
        if let Some(runner) = core.runners.get(&id) {
            core.observer.on_node_finished(&id, runner.status());
        }
        let step = core.scheduler.mark_init_failed(&id);
        apply_scheduler_step(core, step, &mut dispatch, &mut pending);
    }

    if any_init_failed && core.config.stop_at_failure && !core.scheduler.is_aborted() {
        halt_dispatch(core, "operator initialization failed");
    }

    let step = core.scheduler.start();
    apply_scheduler_step(core, step, &mut dispatch, &mut pending);

    drain_pending(core, &mut dispatch, pending);
    finish_step(core, dispatch)
}

/// Handle a node's completion report.
pub fn handle_node_finished(
    core: &mut CoreRuntime,
    node: NodeIdentifier,
    report: NodeReport,
) -> CoreStep {
    let mut dispatch = Vec::new();
    let mut pending = VecDeque::new();
    pending.push_back((node, report));

    drain_pending(core, &mut dispatch, pending);
    finish_step(core, dispatch)
}

/// External abort (shutdown token, Ctrl-C): pending nodes end `NotRun` and
/// running operators see their cancellation token fire.
pub fn handle_abort(core: &mut CoreRuntime) -> CoreStep {
    if !core.scheduler.is_aborted() {
        halt_dispatch(core, "abort requested");
    }
    core.cancellation.cancel();
    finish_step(core, Vec::new())
}

/// Apply completion reports until none are left.
///
/// Reports are queued rather than recursed into because a claimed node whose
/// operator is missing is resolved on the spot with a synthetic failure.
fn drain_pending(
    core: &mut CoreRuntime,
    dispatch: &mut Vec<ScheduledNode>,
    mut pending: VecDeque<(NodeIdentifier, NodeReport)>,
) {
    while let Some((node, report)) = pending.pop_front() {
        if !core.scheduler.is_dispatched(&node) || core.scheduler.outcome_of(&node).is_some() {
            warn!(node = %node, "completion for a node that is not running; ignoring");
            continue;
        }

        let outcome = report.outcome.clone();
        let results = report.results.clone();

        let Some(runner) = core.runners.get_mut(&node) else {
            warn!(node = %node, "completion for unknown node; ignoring");
            continue;
        };
        runner.record(report);
        let status = runner.status();

        // Hand the results to every successor before any of them can be
        // claimed.
        if let Some(results) = results {
            let successors = core.successors.get(&node).cloned().unwrap_or_default();
            for succ in successors {
                if let Some(succ_runner) = core.runners.get_mut(&succ) {
                    succ_runner.add_input(node.clone(), results.reader());
                }
            }
        }

        core.observer.on_node_finished(&node, status);

        let failed = matches!(outcome, NodeOutcome::Failed);
        let step = core.scheduler.handle_completion(&node, outcome);
        apply_scheduler_step(core, step, dispatch, &mut pending);

        if failed && core.config.stop_at_failure && !core.scheduler.is_aborted() {
            halt_dispatch(core, "node failed and stop_at_failure is set");
        }
    }
}

/// Turn a scheduler step into wrapper updates and work to dispatch.
fn apply_scheduler_step(
    core: &mut CoreRuntime,
    step: SchedulerStep,
    dispatch: &mut Vec<ScheduledNode>,
    pending: &mut VecDeque<(NodeIdentifier, NodeReport)>,
) {
    for id in step.newly_skipped {
        let blocker = match core.scheduler.outcome_of(&id) {
            Some(NodeOutcome::Skipped(SkipCause::UpstreamFailure(blocker))) => blocker.clone(),
            _ => continue,
        };
        if let Some(runner) = core.runners.get_mut(&id) {
            runner.mark_upstream_skipped(blocker);
            core.observer.on_node_finished(&id, runner.status());
        }
    }

    for id in step.newly_ready {
        let Some(runner) = core.runners.get(&id) else {
            continue;
        };
        match runner.schedule(core.cancellation.clone()) {
            Some(scheduled) => {
                core.observer.on_node_dispatched(&id);
                dispatch.push(scheduled);
            }
            None => {
                let skip_at_failure = runner.logical_node().config().skip_at_failure;
                let failure = runner
                    .failure()
                    .cloned()
                    .unwrap_or_else(|| FailureKind::Initialization("operator missing".into()));
                pending.push_back((id, NodeReport::failed(failure, skip_at_failure, None)));
            }
        }
    }
}

/// Resolve every never-dispatched node as `NotRun`. Nodes already running
/// are left alone and report as usual.
fn halt_dispatch(core: &mut CoreRuntime, reason: &str) {
    info!(reason, in_flight = core.scheduler.in_flight(), "halting dispatch");

    for id in core.scheduler.abort() {
        let Some(runner) = core.runners.get_mut(&id) else {
            continue;
        };
        if runner.status() != ExecutionStatus::Running {
            continue;
        }
        runner.mark_not_run();
        core.observer.on_node_finished(&id, runner.status());
    }
}

fn finish_step(core: &CoreRuntime, dispatch: Vec<ScheduledNode>) -> CoreStep {
    let mut commands = Vec::new();

    if !dispatch.is_empty() {
        debug!(count = dispatch.len(), "dispatching ready nodes");
        commands.push(CoreCommand::Dispatch(dispatch));
    }

    let keep_running = !core.scheduler.is_finished();
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
