// src/exec/mod.rs

//! Node execution layer.
//!
//! - [`runner`] holds the per-run node wrapper (`OperatorRunner`) and the
//!   single operator invocation a worker performs for it.
//! - [`backend`] provides the `ExecutorBackend` trait and the bounded
//!   `ThreadPoolBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod runner;

pub use backend::{ExecutorBackend, ThreadPoolBackend};
pub use runner::{NodeReport, OperatorRunner, ScheduledNode, run_operator};
