// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`node`] holds identifiers, logical nodes and the failure policies.
//! - [`graph`] holds the directed acyclic graph of logical nodes.
//! - [`status`] defines the node lifecycle states.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which nodes are ready to run, and when successors can be released.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod graph;
pub mod node;
pub mod scheduler;
pub mod scheduler_step;
pub mod status;

pub use graph::Dag;
pub use node::{DagConfig, LogicalNode, NodeConfig, NodeIdentifier, OperatorSpec};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use status::{ExecutionStatus, FailureKind, NodeOutcome, SkipCause};
