// tests/property/scheduler.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use proptest::prelude::*;
use rundag::dag::{
    Dag, ExecutionStatus, LogicalNode, NodeIdentifier, NodeOutcome, Scheduler, SkipCause,
};

/// A random DAG: node `i` may only depend on nodes `0..i`, so it is acyclic
/// by construction.
#[derive(Debug, Clone)]
struct Case {
    deps: Vec<BTreeSet<usize>>,
    failing: HashSet<usize>,
    tolerated: HashSet<usize>,
    stop_at_failure: bool,
    /// Which in-flight node finishes next, taken modulo the in-flight count.
    picks: Vec<usize>,
}

fn name(i: usize) -> NodeIdentifier {
    NodeIdentifier::new(format!("n{i}"))
}

fn case_strategy(max_nodes: usize) -> impl Strategy<Value = Case> {
    (1..=max_nodes).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n),
            proptest::collection::hash_set(0..n, 0..=n / 2),
            proptest::collection::hash_set(0..n, 0..=n / 2),
            any::<bool>(),
            proptest::collection::vec(any::<usize>(), 4 * n),
        )
            .prop_map(move |(raw, failing, tolerated, stop_at_failure, picks)| {
                let deps = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, ds)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            ds.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect();
                Case {
                    deps,
                    failing,
                    tolerated,
                    stop_at_failure,
                    picks,
                }
            })
    })
}

fn build_dag(case: &Case) -> Dag {
    let mut dag = Dag::new();
    for i in 0..case.deps.len() {
        dag.add_node(LogicalNode::new(name(i), "log"));
    }
    for (i, deps) in case.deps.iter().enumerate() {
        for d in deps {
            dag.connect(&name(*d), &name(i)).unwrap();
        }
    }
    dag
}

fn outcome_for(case: &Case, i: usize) -> NodeOutcome {
    match (case.failing.contains(&i), case.tolerated.contains(&i)) {
        (false, _) => NodeOutcome::Success,
        (true, true) => NodeOutcome::Skipped(SkipCause::OwnFailure),
        (true, false) => NodeOutcome::Failed,
    }
}

fn index_of(id: &NodeIdentifier) -> usize {
    id.name()[1..].parse().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn scheduler_respects_dependencies_and_terminates(case in case_strategy(12)) {
        let dag = build_dag(&case);
        let mut scheduler = Scheduler::new(&dag);

        let mut dispatched: Vec<usize> = Vec::new();
        let mut in_flight: Vec<usize> = Vec::new();
        let mut halted = false;

        let check_ready = |scheduler: &Scheduler, ready: &[NodeIdentifier], dispatched: &[usize], halted: bool| {
            for id in ready {
                let i = index_of(id);
                prop_assert!(!dispatched.contains(&i), "{id} dispatched twice");
                prop_assert!(!halted, "{id} dispatched after stop_at_failure halted the run");
                for d in case.deps[i].iter() {
                    let status = scheduler.status_of(&name(*d)).unwrap();
                    prop_assert!(status.is_terminal(), "{id} ready before predecessor n{d}");
                    prop_assert!(
                        matches!(scheduler.outcome_of(&name(*d)), Some(o) if o.unblocks_successors()),
                        "{id} ready although n{d} blocks it"
                    );
                }
            }
            Ok(())
        };

        let step = scheduler.start();
        check_ready(&scheduler, &step.newly_ready, &dispatched, halted)?;
        for id in step.newly_ready {
            let i = index_of(&id);
            dispatched.push(i);
            in_flight.push(i);
        }

        let mut picks = case.picks.iter().cycle();
        let mut guard = 0;
        while !in_flight.is_empty() {
            guard += 1;
            prop_assert!(guard <= 10 * case.deps.len() + 10, "run did not terminate");

            let k = picks.next().copied().unwrap_or(0) % in_flight.len();
            let i = in_flight.swap_remove(k);
            let outcome = outcome_for(&case, i);
            let failed = matches!(outcome, NodeOutcome::Failed);

            let step = scheduler.handle_completion(&name(i), outcome);
            check_ready(&scheduler, &step.newly_ready, &dispatched, halted)?;
            for id in step.newly_ready {
                let j = index_of(&id);
                dispatched.push(j);
                in_flight.push(j);
            }

            if failed && case.stop_at_failure && !halted {
                halted = true;
                scheduler.abort();
            }
        }

        prop_assert!(scheduler.is_finished());
        prop_assert_eq!(scheduler.in_flight(), 0);

        let dispatched: HashSet<usize> = dispatched.into_iter().collect();
        let statuses: HashMap<usize, ExecutionStatus> = (0..case.deps.len())
            .map(|i| (i, scheduler.status_of(&name(i)).unwrap()))
            .collect();

        for (i, status) in statuses.iter() {
            prop_assert!(status.is_terminal());
            match status {
                ExecutionStatus::NotRun => {
                    prop_assert!(case.stop_at_failure);
                    prop_assert!(!dispatched.contains(i));
                }
                ExecutionStatus::Failed => prop_assert!(case.failing.contains(i) && !case.tolerated.contains(i)),
                ExecutionStatus::Success => prop_assert!(!case.failing.contains(i)),
                _ => {}
            }

            // A dispatched node always ends with its own outcome.
            if dispatched.contains(i) {
                prop_assert_eq!(*status, outcome_for(&case, *i).status());
            }
        }

        // Without a halt, a node runs iff none of its ancestors blocked it.
        if !case.stop_at_failure {
            for i in 0..case.deps.len() {
                let blocked = case.deps[i].iter().any(|d| {
                    !matches!(scheduler.outcome_of(&name(*d)), Some(o) if o.unblocks_successors())
                });
                prop_assert_eq!(dispatched.contains(&i), !blocked, "n{} dispatch mismatch", i);
                if blocked {
                    prop_assert!(matches!(
                        scheduler.outcome_of(&name(i)),
                        Some(NodeOutcome::Skipped(SkipCause::UpstreamFailure(_)))
                    ));
                }
            }
        }
    }
}
