// src/dag/node.rs

//! Node identity and the per-node / per-graph policy types.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Unique name of a node within one DAG.
///
/// Equality, ordering and hashing are all by name, so the identifier can be
/// used directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentifier(String);

impl NodeIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeIdentifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NodeIdentifier {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for NodeIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-node failure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// If the node's own operator fails, end in `Skipped` instead of `Failed`.
    ///
    /// A skipped node is a *tolerated* failure: its successors still run,
    /// they just see no results from it.
    #[serde(default)]
    pub skip_at_failure: bool,
}

impl NodeConfig {
    pub fn skip_at_failure(mut self, skip: bool) -> Self {
        self.skip_at_failure = skip;
        self
    }
}

/// Graph-wide execution policy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DagConfig {
    /// Stop dispatching new nodes as soon as any node ends `Failed`.
    ///
    /// Nodes that are already running are allowed to finish; nodes that were
    /// never dispatched end in `NotRun`.
    pub stop_at_failure: bool,

    /// Upper bound on the number of operators executing at the same time.
    pub max_parallelism: usize,
}

impl DagConfig {
    pub fn stop_at_failure(mut self, stop: bool) -> Self {
        self.stop_at_failure = stop;
        self
    }

    pub fn max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n.max(1);
        self
    }
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            stop_at_failure: false,
            max_parallelism: default_max_parallelism(),
        }
    }
}

/// Number of worker slots used when nothing else is configured.
pub fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Which operator a node runs, plus the static parameters handed to
/// `Operator::initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSpec {
    pub kind: String,
    pub params: Value,
}

impl OperatorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// A vertex of the DAG as declared by the caller.
///
/// Structure (edges) lives in [`Dag`](crate::dag::Dag); this only carries what
/// the node *is*.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalNode {
    identifier: NodeIdentifier,
    operator: OperatorSpec,
    config: NodeConfig,
}

impl LogicalNode {
    pub fn new(name: impl Into<NodeIdentifier>, operator_kind: impl Into<String>) -> Self {
        Self {
            identifier: name.into(),
            operator: OperatorSpec::new(operator_kind),
            config: NodeConfig::default(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.operator.params = params;
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identifier(&self) -> &NodeIdentifier {
        &self.identifier
    }

    pub fn operator(&self) -> &OperatorSpec {
        &self.operator
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
