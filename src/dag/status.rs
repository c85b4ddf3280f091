// src/dag/status.rs

//! Node lifecycle states.

use std::fmt;

use crate::dag::node::NodeIdentifier;

/// Status of one node within one run.
///
/// `Running` is the initial status assigned when the runtime wrapper is
/// created; every other variant is terminal and never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Skipped,
    /// Never dispatched because `stop_at_failure` halted the run.
    NotRun,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
            ExecutionStatus::NotRun => "NOT_RUN",
        };
        f.pad(s)
    }
}

/// Why a node's own attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The operator returned an error.
    Operator(String),
    /// The operator panicked.
    Panicked(String),
    /// The operator could not be initialized; it was never invoked.
    Initialization(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Operator(msg) => write!(f, "operator error: {msg}"),
            FailureKind::Panicked(msg) => write!(f, "operator panicked: {msg}"),
            FailureKind::Initialization(msg) => write!(f, "initialization failed: {msg}"),
        }
    }
}

/// Why a node ended `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// The node failed and is configured with `skip_at_failure`.
    OwnFailure,
    /// A predecessor did not succeed, so the node was never dispatched.
    UpstreamFailure(NodeIdentifier),
}

/// Terminal outcome of a node as reported back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    Failed,
    Skipped(SkipCause),
    NotRun,
}

impl NodeOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            NodeOutcome::Success => ExecutionStatus::Success,
            NodeOutcome::Failed => ExecutionStatus::Failed,
            NodeOutcome::Skipped(_) => ExecutionStatus::Skipped,
            NodeOutcome::NotRun => ExecutionStatus::NotRun,
        }
    }

    /// Whether successors may still run after this outcome.
    ///
    /// A failure tolerated via `skip_at_failure` does not block the
    /// branch; anything else that is not a success does.
    pub fn unblocks_successors(&self) -> bool {
        matches!(
            self,
            NodeOutcome::Success | NodeOutcome::Skipped(SkipCause::OwnFailure)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        for s in [
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
            ExecutionStatus::Skipped,
            ExecutionStatus::NotRun,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn upstream_skip_blocks_but_own_skip_does_not() {
        assert!(NodeOutcome::Skipped(SkipCause::OwnFailure).unblocks_successors());
        assert!(
            !NodeOutcome::Skipped(SkipCause::UpstreamFailure("a".into())).unblocks_successors()
        );
        assert!(!NodeOutcome::Failed.unblocks_successors());
        assert!(!NodeOutcome::NotRun.unblocks_successors());
    }
}
