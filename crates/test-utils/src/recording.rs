use std::sync::Mutex;

use rundag::dag::{ExecutionStatus, NodeIdentifier};
use rundag::engine::{ExecutionObserver, ExecutionReport};

/// One observer callback, in the order the coordinator made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    RunStarted(usize),
    Dispatched(String),
    Finished(String, ExecutionStatus),
    RunFinished,
}

/// Observer that keeps a log of every callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    /// Node names in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Dispatched(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Position of the first matching event, if any.
    pub fn position(&self, wanted: &Observed) -> Option<usize> {
        self.events().iter().position(|e| e == wanted)
    }

    fn push(&self, event: Observed) {
        self.events.lock().unwrap().push(event);
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_run_started(&self, nodes: usize) {
        self.push(Observed::RunStarted(nodes));
    }

    fn on_node_dispatched(&self, node: &NodeIdentifier) {
        self.push(Observed::Dispatched(node.to_string()));
    }

    fn on_node_finished(&self, node: &NodeIdentifier, status: ExecutionStatus) {
        self.push(Observed::Finished(node.to_string(), status));
    }

    fn on_run_finished(&self, _report: &ExecutionReport) {
        self.push(Observed::RunFinished);
    }
}
