//! Operators that only exist to exercise the executor from tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use rundag::dataflow::ExecutionResult;
use rundag::operator::{Operator, OperatorConfig, OperatorContext, OperatorRegistry};
use serde_json::json;

/// Panics every time it runs.
#[derive(Debug, Default)]
pub struct PanicOperator;

impl Operator for PanicOperator {
    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        panic!("operator of node '{}' panicked", ctx.identifier());
    }
}

/// Always fails in `initialize`.
#[derive(Debug, Default)]
pub struct BrokenInitOperator;

impl Operator for BrokenInitOperator {
    fn initialize(&mut self, config: &OperatorConfig) -> anyhow::Result<()> {
        bail!("node '{}' refuses to initialize", config.node)
    }

    fn run(&self, _ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        unreachable!("never dispatched")
    }
}

/// Shared counters of how many hold operators run at the same time.
#[derive(Debug, Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl Concurrency {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Sleeps for `hold` while counted in [`Concurrency`].
pub struct HoldOperator {
    concurrency: Arc<Concurrency>,
    hold: Duration,
}

impl Operator for HoldOperator {
    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        let now = self.concurrency.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.concurrency.peak.fetch_max(now, Ordering::SeqCst);
        self.concurrency.total.fetch_add(1, Ordering::SeqCst);

        thread::sleep(self.hold);

        self.concurrency.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ExecutionResult::new("hold", ctx.identifier().name()))
    }
}

/// Blocks until the run is cancelled, then fails.
#[derive(Debug, Default)]
pub struct WaitForCancelOperator;

impl Operator for WaitForCancelOperator {
    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        while !ctx.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }
        bail!("node '{}' cancelled", ctx.identifier())
    }
}

/// What a [`CaptureOperator`] saw: node name and the predecessors whose
/// results were present, sorted.
pub type Captured = Arc<Mutex<Vec<(String, Vec<String>)>>>;

/// Records the inputs it was handed, and emits its own name.
pub struct CaptureOperator {
    seen: Captured,
}

impl Operator for CaptureOperator {
    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        let inputs: Vec<String> = ctx
            .sorted_inputs()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        self.seen
            .lock()
            .unwrap()
            .push((ctx.identifier().to_string(), inputs));
        Ok(ExecutionResult::new("name", json!(ctx.identifier().name())))
    }
}

/// Built-ins plus `panic`, `broken_init` and `wait_for_cancel`.
pub fn test_registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::with_builtins();
    registry.register_default::<PanicOperator>("panic");
    registry.register_default::<BrokenInitOperator>("broken_init");
    registry.register_default::<WaitForCancelOperator>("wait_for_cancel");
    registry
}

/// Register `hold`, sharing `concurrency` across all instances.
pub fn register_hold(registry: &mut OperatorRegistry, concurrency: Arc<Concurrency>, hold: Duration) {
    registry.register("hold", move || {
        Box::new(HoldOperator {
            concurrency: Arc::clone(&concurrency),
            hold,
        })
    });
}

/// Register `capture`, appending to `seen`.
pub fn register_capture(registry: &mut OperatorRegistry, seen: Captured) {
    registry.register("capture", move || {
        Box::new(CaptureOperator {
            seen: Arc::clone(&seen),
        })
    });
}
