use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use rundag::engine::RuntimeEvent;
use rundag::errors::{Result, RundagError};
use rundag::exec::{ExecutorBackend, ScheduledNode, run_operator};
use tokio::sync::mpsc;

/// A fake executor that:
/// - records the order in which nodes were handed to it
/// - runs each node's operator inline on the coordinator task
/// - immediately reports `NodeFinished` for each of them.
///
/// With no worker threads involved the whole run is deterministic. Reports
/// go through an unbounded queue drained by one forwarding task, so a batch
/// larger than the runtime channel never blocks the coordinator and reports
/// keep their order across batches.
///
/// Must be created inside a Tokio runtime.
pub struct InlineExecutor {
    report_tx: mpsc::UnboundedSender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl InlineExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
        tokio::spawn(async move {
            while let Some(event) = report_rx.recv().await {
                if runtime_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Self {
            report_tx,
            executed,
        }
    }
}

impl ExecutorBackend for InlineExecutor {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let report_tx = self.report_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for node in nodes {
                executed
                    .lock()
                    .unwrap()
                    .push(node.identifier.to_string());

                let report = run_operator(&node);
                report_tx
                    .send(RuntimeEvent::NodeFinished {
                        node: node.identifier.clone(),
                        report,
                    })
                    .map_err(|e| RundagError::Runtime(e.to_string()))?;
            }
            Ok(())
        })
    }
}

/// A backend that accepts nodes and never reports them, for exercising
/// abort and shutdown paths.
pub struct BlackHoleExecutor {
    received: Arc<Mutex<Vec<ScheduledNode>>>,
}

impl BlackHoleExecutor {
    pub fn new(received: Arc<Mutex<Vec<ScheduledNode>>>) -> Self {
        Self { received }
    }
}

impl ExecutorBackend for BlackHoleExecutor {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let received = Arc::clone(&self.received);
        Box::pin(async move {
            received.lock().unwrap().extend(nodes);
            Ok(())
        })
    }
}
