// src/engine/mod.rs

//! Orchestration engine for one DAG run.
//!
//! This module ties together:
//! - the DAG scheduler (readiness bookkeeping)
//! - the per-node runtime wrappers and their incoming result readers
//! - the failure policy (`skip_at_failure`, `stop_at_failure`)
//! - the runtime event loop that reacts to node completions and aborts
//!
//! The pure core state machine lives in [`core`] and [`event_handlers`];
//! the async/IO shell is implemented in [`runtime`]; [`executor`] is the
//! public entry point that wires both to a worker pool.

use crate::dag::node::NodeIdentifier;
use crate::exec::runner::NodeReport;

/// Events flowing into the runtime from workers and the caller.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched node finished its single attempt.
    NodeFinished {
        node: NodeIdentifier,
        report: NodeReport,
    },
    /// Stop dispatching new nodes (e.g. Ctrl-C).
    AbortRequested,
}

pub mod core;
pub mod event_handlers;
pub mod executor;
pub mod observer;
pub mod report;
pub mod runtime;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use executor::DagExecutor;
pub use observer::{ExecutionObserver, TracingObserver};
pub use report::ExecutionReport;
pub use runtime::Runtime;
