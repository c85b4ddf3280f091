// src/engine/report.rs

//! Summary of a finished run.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::dag::node::NodeIdentifier;
use crate::dag::status::ExecutionStatus;

/// Final status of every node in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    statuses: BTreeMap<NodeIdentifier, ExecutionStatus>,
    elapsed: Duration,
}

impl ExecutionReport {
    pub fn new(statuses: BTreeMap<NodeIdentifier, ExecutionStatus>, elapsed: Duration) -> Self {
        Self { statuses, elapsed }
    }

    pub fn status(&self, node: &NodeIdentifier) -> Option<ExecutionStatus> {
        self.statuses.get(node).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<NodeIdentifier, ExecutionStatus> {
        &self.statuses
    }

    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// Nodes that ended with `status`, in identifier order.
    pub fn nodes_with(&self, status: ExecutionStatus) -> Vec<&NodeIdentifier> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id)
            .collect()
    }

    /// True if every node succeeded.
    pub fn is_success(&self) -> bool {
        self.statuses.values().all(|s| *s == ExecutionStatus::Success)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
