// src/dataflow.rs

//! Results produced by nodes and the readers downstream nodes use to
//! consume them.
//!
//! A finished node's [`ExecutionResults`] is frozen behind an `Arc` and
//! shared with every successor; each consumer gets its own
//! [`ExecutionResultsReader`] cursor, so reading never interferes across
//! consumers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::dag::node::NodeIdentifier;

/// One named output value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    key: String,
    value: Value,
}

impl ExecutionResult {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// All named results of one node's invocation, ordered by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResults {
    node: NodeIdentifier,
    results: BTreeMap<String, ExecutionResult>,
}

impl ExecutionResults {
    pub fn new(node: NodeIdentifier) -> Self {
        Self {
            node,
            results: BTreeMap::new(),
        }
    }

    /// The node that produced these results.
    pub fn node(&self) -> &NodeIdentifier {
        &self.node
    }

    /// Add a result, replacing any earlier one with the same key.
    pub fn insert(&mut self, result: ExecutionResult) {
        self.results.insert(result.key.clone(), result);
    }

    pub fn get(&self, key: &str) -> Option<&ExecutionResult> {
        self.results.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// A fresh reader positioned at the first result.
    pub fn reader(self: &Arc<Self>) -> ExecutionResultsReader {
        ExecutionResultsReader::new(Arc::clone(self))
    }
}

impl From<(NodeIdentifier, ExecutionResult)> for ExecutionResults {
    fn from((node, result): (NodeIdentifier, ExecutionResult)) -> Self {
        let mut results = ExecutionResults::new(node);
        results.insert(result);
        results
    }
}

/// Restartable cursor over one node's results.
///
/// Never blocks: readers only exist for nodes that already finished.
#[derive(Debug, Clone)]
pub struct ExecutionResultsReader {
    results: Arc<ExecutionResults>,
    position: usize,
}

impl ExecutionResultsReader {
    pub fn new(results: Arc<ExecutionResults>) -> Self {
        Self {
            results,
            position: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.position < self.results.len()
    }

    /// Rewind to the first result.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// The underlying results, independent of the cursor position.
    pub fn results(&self) -> &Arc<ExecutionResults> {
        &self.results
    }
}

impl Iterator for ExecutionResultsReader {
    type Item = ExecutionResult;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.results.results.values().nth(self.position)?.clone();
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.results.len().saturating_sub(self.position);
        (left, Some(left))
    }
}
