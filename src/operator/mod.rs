// src/operator/mod.rs

//! The pluggable unit of work a node runs.
//!
//! - [`Operator`] is the narrow contract the engine calls through.
//! - [`registry`] maps the operator kind named on a node to a factory.
//! - [`builtin`] provides the operators the CLI ships with.

pub mod builtin;
pub mod registry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

use crate::dag::node::NodeIdentifier;
use crate::dataflow::{ExecutionResult, ExecutionResults};

pub use registry::{OperatorFactory, OperatorRegistry};

/// A node's business logic.
///
/// `initialize` is called once, before the run starts, with the node's
/// static parameters. `run` is called at most once per run. An error from
/// either is contained to the node: the engine records it in the node's
/// status and carries on with unrelated branches.
pub trait Operator: Send + Sync {
    fn initialize(&mut self, _config: &OperatorConfig) -> anyhow::Result<()> {
        Ok(())
    }

    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult>;
}

/// Drive `fut` to completion from an operator's synchronous `run`.
///
/// Workers are blocking threads of the surrounding Tokio runtime, so the
/// future runs on that runtime. Outside of one (plain callers, unit tests) a
/// private current-thread runtime is built for it. Must not be called from
/// an async task.
pub fn block_on_worker<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .context("building runtime for operator")?;
            Ok(runtime.block_on(fut))
        }
    }
}

/// Static configuration handed to [`Operator::initialize`].
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub node: NodeIdentifier,
    pub params: Value,
}

impl OperatorConfig {
    /// String parameter `key`, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer parameter `key`, if present.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}

/// What an operator sees when it runs.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    identifier: NodeIdentifier,
    inputs: HashMap<NodeIdentifier, Arc<ExecutionResults>>,
    cancellation: CancellationToken,
}

impl OperatorContext {
    pub fn new(
        identifier: NodeIdentifier,
        inputs: HashMap<NodeIdentifier, Arc<ExecutionResults>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            identifier,
            inputs,
            cancellation,
        }
    }

    pub fn identifier(&self) -> &NodeIdentifier {
        &self.identifier
    }

    /// Results of every predecessor that produced any, keyed by predecessor.
    ///
    /// Predecessors that were skipped under `skip_at_failure` are absent;
    /// it is up to the operator to decide what that means.
    pub fn inputs(&self) -> &HashMap<NodeIdentifier, Arc<ExecutionResults>> {
        &self.inputs
    }

    pub fn input(&self, predecessor: &NodeIdentifier) -> Option<&Arc<ExecutionResults>> {
        self.inputs.get(predecessor)
    }

    /// Inputs sorted by predecessor identifier.
    pub fn sorted_inputs(&self) -> Vec<(&NodeIdentifier, &Arc<ExecutionResults>)> {
        let mut inputs: Vec<_> = self.inputs.iter().collect();
        inputs.sort_by(|a, b| a.0.cmp(b.0));
        inputs
    }

    /// Set when the run was aborted from outside (shutdown, Ctrl-C); a
    /// `stop_at_failure` halt leaves it unset. Long-running operators should
    /// check it.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
