// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Result, RundagError};
use crate::exec::ExecutorBackend;
use crate::exec::runner::ScheduledNode;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Drives the core runtime in response to `RuntimeEvent`s and delegates
/// actual operator execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from the
/// channel, dispatching nodes to the backend, and turning the shutdown token
/// into an abort.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    shutdown: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abort the run when `shutdown` is cancelled (e.g. on Ctrl-C).
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Main event loop.
    ///
    /// - Seeds the run through [`CoreRuntime::start`].
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them to the core.
    /// - Executes commands returned by the core until every node is terminal.
    ///
    /// Returns the core so the caller can inspect the final wrappers.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!("rundag runtime started");

        let step = self.core.start();
        if !self.apply(step).await? {
            info!("runtime exiting");
            return Ok(self.core);
        }

        let mut abort_sent = false;

        loop {
            let event = tokio::select! {
                biased;

                _ = self.shutdown.cancelled(), if !abort_sent => {
                    abort_sent = true;
                    warn!("shutdown requested; aborting run");
                    RuntimeEvent::AbortRequested
                }

                maybe = self.event_rx.recv() => match maybe {
                    Some(event) => event,
                    None => {
                        return Err(RundagError::Runtime(format!(
                            "event channel closed with {} node(s) still running",
                            self.core.in_flight()
                        )));
                    }
                },
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            if !self.apply(step).await? {
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    /// Execute the commands of one step. Returns the core's `keep_running`.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        if !step.keep_running {
            info!("core requested exit; stopping runtime");
        }
        Ok(step.keep_running)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(nodes) => self.spawn_ready(nodes).await,
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
                Ok(())
            }
        }
    }

    async fn spawn_ready(&mut self, nodes: Vec<ScheduledNode>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = nodes.iter().map(|n| n.identifier.name()).collect();
        debug!(?names, "spawning ready nodes");

        self.executor.spawn_ready_nodes(nodes).await
    }
}
