#![allow(dead_code)]

use std::sync::Arc;

use rundag::dag::{Dag, DagConfig};
use rundag::engine::{DagExecutor, ExecutionReport};
use rundag::operator::OperatorRegistry;
use rundag::operator::builtin::EXECUTION_LOG_KEY;
use rundag_test_utils::recording::RecordingObserver;
use rundag_test_utils::with_timeout;
use serde_json::Value;

/// Everything a test wants to look at after one run.
pub struct Outcome {
    pub report: ExecutionReport,
    pub executor: DagExecutor,
    pub observer: Arc<RecordingObserver>,
}

impl Outcome {
    /// Accumulated execution log of a `log` node, if it produced one.
    pub fn log_of(&self, name: &str) -> Option<Vec<String>> {
        let mut reader = self.executor.results_reader(&name.into())?;
        let result = reader.find(|r| r.key() == EXECUTION_LOG_KEY)?;
        let entries = result.value().as_array()?;
        Some(
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }
}

/// Run `dag` on the thread-pool backend with a recording observer.
pub async fn run_dag(dag: &Dag, policy: DagConfig, registry: OperatorRegistry) -> Outcome {
    let observer = Arc::new(RecordingObserver::new());
    let mut executor = DagExecutor::new(registry).with_observer(observer.clone());

    let report = with_timeout(executor.execute(dag, &policy))
        .await
        .expect("run should start");

    Outcome {
        report,
        executor,
        observer,
    }
}
