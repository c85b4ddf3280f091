// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::node::NodeIdentifier;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes claimed for dispatch as a result of this step. Each node
    /// appears in at most one step per run.
    pub newly_ready: Vec<NodeIdentifier>,
    /// Nodes resolved as `Skipped` because a predecessor did not succeed.
    pub newly_skipped: Vec<NodeIdentifier>,
    /// Whether this step left every node in a terminal state.
    pub run_just_finished: bool,
}
