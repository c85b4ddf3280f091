// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production worker pool in [`ThreadPoolBackend`].
//!
//! Whatever the backend does, it must eventually send exactly one
//! `RuntimeEvent::NodeFinished` per node it was given.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error};

use crate::dag::status::FailureKind;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::runner::{NodeReport, ScheduledNode, run_operator};

/// Trait abstracting how ready nodes are executed.
///
/// Production code uses [`ThreadPoolBackend`]; tests can provide their own
/// implementation that runs nodes inline or under manual control.
pub trait ExecutorBackend: Send {
    /// Hand the given nodes over for execution.
    ///
    /// The returned future resolves once the nodes are *submitted*, not
    /// once they finish; completion is reported through the runtime channel.
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Bounded worker pool on top of Tokio's blocking thread pool.
///
/// Each submitted node waits for one of `max_parallelism` permits, then runs
/// its operator via `spawn_blocking`. Operators are plain synchronous code,
/// so they never stall the async coordinator.
pub struct ThreadPoolBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    permits: Arc<Semaphore>,
}

impl ThreadPoolBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, max_parallelism: usize) -> Self {
        Self {
            runtime_tx,
            permits: Arc::new(Semaphore::new(max_parallelism.max(1))),
        }
    }
}

impl ExecutorBackend for ThreadPoolBackend {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let permits = Arc::clone(&self.permits);

        Box::pin(async move {
            for node in nodes {
                let tx = tx.clone();
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let id = node.identifier.clone();
                    let skip_at_failure = node.skip_at_failure;

                    let report = match permits.acquire_owned().await {
                        Ok(_permit) => {
                            debug!(node = %id, "worker slot acquired");
                            match tokio::task::spawn_blocking(move || run_operator(&node)).await {
                                Ok(report) => report,
                                Err(e) => {
                                    error!(node = %id, error = %e, "worker task did not complete");
                                    NodeReport::failed(
                                        FailureKind::Panicked(e.to_string()),
                                        skip_at_failure,
                                        None,
                                    )
                                }
                            }
                        }
                        Err(e) => NodeReport::failed(
                            FailureKind::Operator(format!("worker pool closed: {e}")),
                            skip_at_failure,
                            None,
                        ),
                    };

                    if tx
                        .send(RuntimeEvent::NodeFinished { node: id.clone(), report })
                        .await
                        .is_err()
                    {
                        error!(node = %id, "runtime channel closed before completion was reported");
                    }
                });
            }
            Ok(())
        })
    }
}
