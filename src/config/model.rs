// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::dag::node::{DagConfig, LogicalNode, NodeConfig, default_max_parallelism};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// stop_at_failure = true
/// max_parallelism = 4
///
/// [node.build]
/// operator = "command"
/// params = { cmd = "make" }
///
/// [node.test]
/// operator = "command"
/// after = ["build"]
/// params = { cmd = "make test" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Graph-wide policy from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All nodes from `[node.<name>]`, keyed by node name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeSection>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`
/// (or [`ConfigFile::new_unchecked`] in code that already knows the input
/// is sound).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    node: BTreeMap<String, NodeSection>,
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Halt scheduling of new nodes once any node fails.
    #[serde(default)]
    pub stop_at_failure: bool,

    /// Worker pool size. Defaults to the number of available CPUs.
    #[serde(default)]
    pub max_parallelism: Option<usize>,
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// Registered operator kind, e.g. `"command"` or `"log"`.
    pub operator: String,

    /// Nodes that must be terminal before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Turn this node's own failure into `Skipped` so successors still run.
    #[serde(default)]
    pub skip_at_failure: bool,

    /// Operator-specific parameters, passed through untouched.
    #[serde(default)]
    pub params: Value,
}

impl ConfigFile {
    pub fn new_unchecked(config: ConfigSection, node: BTreeMap<String, NodeSection>) -> Self {
        Self { config, node }
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    /// Node sections in name order.
    pub fn nodes(&self) -> impl Iterator<Item = (&String, &NodeSection)> {
        self.node.iter()
    }

    pub fn node(&self, name: &str) -> Option<&NodeSection> {
        self.node.get(name)
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    /// One [`LogicalNode`] per `[node.<name>]` section.
    pub fn logical_nodes(&self) -> Vec<LogicalNode> {
        self.node
            .iter()
            .map(|(name, section)| section.to_logical_node(name))
            .collect()
    }

    /// Graph-wide policy, with defaults applied.
    pub fn dag_config(&self) -> DagConfig {
        DagConfig::default()
            .stop_at_failure(self.config.stop_at_failure)
            .max_parallelism(
                self.config
                    .max_parallelism
                    .unwrap_or_else(default_max_parallelism),
            )
    }
}

impl NodeSection {
    fn to_logical_node(&self, name: &str) -> LogicalNode {
        LogicalNode::new(name, self.operator.as_str())
            .with_params(self.params.clone())
            .with_config(NodeConfig::default().skip_at_failure(self.skip_at_failure))
    }
}
