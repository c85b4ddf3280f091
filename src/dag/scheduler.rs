use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::Dag;
use crate::dag::node::NodeIdentifier;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::status::{ExecutionStatus, NodeOutcome, SkipCause};

/// Readiness bookkeeping for a single node.
#[derive(Debug, Clone)]
struct NodeState {
    predecessors: Vec<NodeIdentifier>,
    successors: Vec<NodeIdentifier>,
    /// Predecessors that have not reached a terminal outcome yet.
    remaining: usize,
    /// Dispatch claim. Set exactly once, when the node is handed out as ready.
    dispatched: bool,
    /// Terminal outcome, once known.
    outcome: Option<NodeOutcome>,
}

/// Per-run state machine that decides which nodes are ready.
///
/// It is responsible for:
/// - handing out the roots when a run starts
/// - recording terminal outcomes reported by workers
/// - releasing a successor once *all* of its predecessors are terminal
/// - skipping successors of nodes that failed
/// - marking never-dispatched nodes `NotRun` when the run is aborted
///
/// The scheduler is synchronous and owned by a single coordinator, so the
/// claim on `dispatched` can never race: every node is returned in
/// `newly_ready` at most once per run.
#[derive(Debug)]
pub struct Scheduler {
    nodes: HashMap<NodeIdentifier, NodeState>,
    /// Node order from the DAG, so steps are deterministic.
    order: Vec<NodeIdentifier>,
    aborted: bool,
}

impl Scheduler {
    /// Construct a scheduler for one run over `dag`.
    pub fn new(dag: &Dag) -> Self {
        let mut nodes = HashMap::new();
        let mut order = Vec::new();

        for node in dag.nodes() {
            let id = node.identifier().clone();
            let predecessors = dag.predecessors_of(&id).to_vec();
            let successors = dag.successors_of(&id).to_vec();
            nodes.insert(
                id.clone(),
                NodeState {
                    remaining: predecessors.len(),
                    predecessors,
                    successors,
                    dispatched: false,
                    outcome: None,
                },
            );
            order.push(id);
        }

        Self {
            nodes,
            order,
            aborted: false,
        }
    }

    /// Record that a node's operator could not be initialized.
    ///
    /// Must be called before [`start`](Self::start). The node is terminal
    /// (`Failed`) without ever being dispatched, and its successors are
    /// skipped once their other predecessors finish.
    pub fn mark_init_failed(&mut self, id: &NodeIdentifier) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.nodes.get_mut(id) {
            Some(state) if state.outcome.is_none() && !state.dispatched => {
                state.outcome = Some(NodeOutcome::Failed);
                warn!(node = %id, "operator failed to initialize; node will not run");
                self.release_successors(id, &mut step);
            }
            Some(_) => {
                warn!(node = %id, "init failure reported for a node that is already resolved; ignoring");
            }
            None => {
                warn!(node = %id, "init failure reported for unknown node; ignoring");
            }
        }

        step.run_just_finished = self.is_finished();
        step
    }

    /// Claim every node whose predecessors are all resolved (the roots, at
    /// the start of a run) and return them as ready.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.aborted {
            step.run_just_finished = self.is_finished();
            return step;
        }

        for id in self.order.iter() {
            if let Some(state) = self.nodes.get_mut(id) {
                if state.remaining == 0 && state.outcome.is_none() && !state.dispatched {
                    state.dispatched = true;
                    debug!(node = %id, "root claimed for dispatch");
                    step.newly_ready.push(id.clone());
                }
            }
        }

        info!(roots = step.newly_ready.len(), "scheduler: run started");
        step.run_just_finished = self.is_finished();
        step
    }

    /// Record the terminal outcome of a dispatched node and release whatever
    /// became ready because of it.
    pub fn handle_completion(&mut self, id: &NodeIdentifier, outcome: NodeOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.nodes.get_mut(id) {
            Some(state) if state.dispatched && state.outcome.is_none() => {
                debug!(node = %id, status = %outcome.status(), "node reached terminal status");
                state.outcome = Some(outcome);
                self.release_successors(id, &mut step);
            }
            Some(_) => {
                warn!(node = %id, "completion for a node that was not running; ignoring");
            }
            None => {
                warn!(node = %id, "completion for unknown node; ignoring");
            }
        }

        step.run_just_finished = self.is_finished();
        step
    }

    /// Stop handing out new work. Every node that was never dispatched ends
    /// `NotRun`; nodes already running are left alone.
    pub fn abort(&mut self) -> Vec<NodeIdentifier> {
        self.aborted = true;

        let mut not_run = Vec::new();
        for id in self.order.iter() {
            if let Some(state) = self.nodes.get_mut(id) {
                if state.outcome.is_none() && !state.dispatched {
                    state.outcome = Some(NodeOutcome::NotRun);
                    not_run.push(id.clone());
                }
            }
        }

        if !not_run.is_empty() {
            info!(count = not_run.len(), "scheduler: run aborted; pending nodes marked NotRun");
        }
        not_run
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// True once every node has a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.nodes.values().all(|s| s.outcome.is_some())
    }

    /// Number of nodes dispatched but not yet reported back.
    pub fn in_flight(&self) -> usize {
        self.nodes
            .values()
            .filter(|s| s.dispatched && s.outcome.is_none())
            .count()
    }

    pub fn outcome_of(&self, id: &NodeIdentifier) -> Option<&NodeOutcome> {
        self.nodes.get(id)?.outcome.as_ref()
    }

    /// Status of a node; `Running` until it has a terminal outcome.
    pub fn status_of(&self, id: &NodeIdentifier) -> Option<ExecutionStatus> {
        let state = self.nodes.get(id)?;
        Some(
            state
                .outcome
                .as_ref()
                .map(NodeOutcome::status)
                .unwrap_or(ExecutionStatus::Running),
        )
    }

    /// Whether a node has been claimed for dispatch in this run.
    pub fn is_dispatched(&self, id: &NodeIdentifier) -> bool {
        self.nodes.get(id).is_some_and(|s| s.dispatched)
    }

    /// Whether every predecessor of `id` is terminal.
    pub fn predecessors_terminal(&self, id: &NodeIdentifier) -> Option<bool> {
        let state = self.nodes.get(id)?;
        Some(state.predecessors.iter().all(|p| self.outcome_of(p).is_some()))
    }

    /// Walk successors of a freshly resolved node, decrementing their
    /// remaining counts. A successor whose count hits zero is either claimed
    /// (all predecessors let it through) or skipped, which cascades.
    fn release_successors(&mut self, resolved: &NodeIdentifier, step: &mut SchedulerStep) {
        let mut stack = vec![resolved.clone()];

        while let Some(done) = stack.pop() {
            let successors = match self.nodes.get(&done) {
                Some(state) => state.successors.clone(),
                None => continue,
            };

            for succ in successors {
                let ready_to_resolve = match self.nodes.get_mut(&succ) {
                    Some(state) => {
                        state.remaining = state.remaining.saturating_sub(1);
                        state.remaining == 0 && state.outcome.is_none() && !state.dispatched
                    }
                    None => false,
                };

                if !ready_to_resolve || self.aborted {
                    continue;
                }

                match self.blocking_predecessor(&succ) {
                    Some(blocker) => {
                        debug!(
                            node = %succ,
                            upstream = %blocker,
                            "predecessor did not succeed; skipping node"
                        );
                        if let Some(state) = self.nodes.get_mut(&succ) {
                            state.outcome =
                                Some(NodeOutcome::Skipped(SkipCause::UpstreamFailure(blocker)));
                        }
                        step.newly_skipped.push(succ.clone());
                        stack.push(succ);
                    }
                    None => {
                        if let Some(state) = self.nodes.get_mut(&succ) {
                            state.dispatched = true;
                        }
                        debug!(node = %succ, "all predecessors terminal; claimed for dispatch");
                        step.newly_ready.push(succ);
                    }
                }
            }
        }
    }

    /// First predecessor whose outcome blocks `id` from running.
    fn blocking_predecessor(&self, id: &NodeIdentifier) -> Option<NodeIdentifier> {
        let state = self.nodes.get(id)?;
        state
            .predecessors
            .iter()
            .find(|p| {
                self.outcome_of(p)
                    .is_none_or(|outcome| !outcome.unblocks_successors())
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::node::LogicalNode;

    fn chain() -> Dag {
        let mut dag = Dag::new();
        let (a, b, c) = (
            LogicalNode::new("1", "log"),
            LogicalNode::new("2", "log"),
            LogicalNode::new("3", "log"),
        );
        dag.add_edge(&a, &b).unwrap();
        dag.add_edge(&b, &c).unwrap();
        dag
    }

    fn names(ids: &[NodeIdentifier]) -> Vec<&str> {
        ids.iter().map(|id| id.name()).collect()
    }

    #[test]
    fn chain_releases_one_node_at_a_time() {
        let mut s = Scheduler::new(&chain());

        let step = s.start();
        assert_eq!(names(&step.newly_ready), vec!["1"]);

        let step = s.handle_completion(&"1".into(), NodeOutcome::Success);
        assert_eq!(names(&step.newly_ready), vec!["2"]);
        assert!(!step.run_just_finished);

        let step = s.handle_completion(&"2".into(), NodeOutcome::Success);
        assert_eq!(names(&step.newly_ready), vec!["3"]);

        let step = s.handle_completion(&"3".into(), NodeOutcome::Success);
        assert!(step.newly_ready.is_empty());
        assert!(step.run_just_finished);
    }

    #[test]
    fn failure_skips_downstream_without_dispatch() {
        let mut s = Scheduler::new(&chain());
        s.start();
        s.handle_completion(&"1".into(), NodeOutcome::Success);

        let step = s.handle_completion(&"2".into(), NodeOutcome::Failed);
        assert!(step.newly_ready.is_empty());
        assert_eq!(names(&step.newly_skipped), vec!["3"]);
        assert!(step.run_just_finished);
        assert!(!s.is_dispatched(&"3".into()));
        assert_eq!(
            s.outcome_of(&"3".into()),
            Some(&NodeOutcome::Skipped(SkipCause::UpstreamFailure("2".into())))
        );
    }

    #[test]
    fn tolerated_skip_still_releases_successor() {
        let mut s = Scheduler::new(&chain());
        s.start();
        s.handle_completion(&"1".into(), NodeOutcome::Success);

        let step = s.handle_completion(&"2".into(), NodeOutcome::Skipped(SkipCause::OwnFailure));
        assert_eq!(names(&step.newly_ready), vec!["3"]);
    }

    #[test]
    fn fan_in_waits_for_every_predecessor() {
        let mut dag = Dag::new();
        let (a, b, leaf) = (
            LogicalNode::new("a", "log"),
            LogicalNode::new("b", "log"),
            LogicalNode::new("leaf", "log"),
        );
        dag.add_edge(&a, &leaf).unwrap();
        dag.add_edge(&b, &leaf).unwrap();

        let mut s = Scheduler::new(&dag);
        let step = s.start();
        assert_eq!(step.newly_ready.len(), 2);

        let step = s.handle_completion(&"b".into(), NodeOutcome::Success);
        assert!(step.newly_ready.is_empty());
        assert_eq!(s.predecessors_terminal(&"leaf".into()), Some(false));

        let step = s.handle_completion(&"a".into(), NodeOutcome::Success);
        assert_eq!(names(&step.newly_ready), vec!["leaf"]);
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let mut s = Scheduler::new(&chain());
        s.start();
        let first = s.handle_completion(&"1".into(), NodeOutcome::Success);
        let second = s.handle_completion(&"1".into(), NodeOutcome::Success);

        assert_eq!(names(&first.newly_ready), vec!["2"]);
        assert!(second.newly_ready.is_empty());
    }

    #[test]
    fn abort_marks_undispatched_nodes_not_run() {
        let mut s = Scheduler::new(&chain());
        s.start();

        let not_run = s.abort();
        assert_eq!(names(&not_run), vec!["2", "3"]);
        assert_eq!(s.in_flight(), 1);
        assert!(!s.is_finished());

        let step = s.handle_completion(&"1".into(), NodeOutcome::Success);
        assert!(step.newly_ready.is_empty());
        assert!(step.run_just_finished);
        assert_eq!(s.status_of(&"2".into()), Some(ExecutionStatus::NotRun));
    }

    #[test]
    fn init_failure_resolves_root_and_skips_branch() {
        let mut s = Scheduler::new(&chain());

        let step = s.mark_init_failed(&"1".into());
        assert_eq!(names(&step.newly_skipped), vec!["2", "3"]);

        let step = s.start();
        assert!(step.newly_ready.is_empty());
        assert!(step.run_just_finished);
        assert_eq!(s.status_of(&"1".into()), Some(ExecutionStatus::Failed));
    }
}
