use std::collections::BTreeSet;

use proptest::prelude::*;

use jobhost::prereq::{PREREQ_TABLE_NAME, PrereqManager, SUCCESSOR_TABLE_NAME};
use jobhost::storage::MemoryTable;
use jobhost::types::{FunctionStatus, InvocationId};
use jobhost_test_utils::fakes::{RecordingActivator, StaticStatusOracle};

/// Prerequisite lists for a random DAG: node `i` may only depend on `0..i`.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_nodes).prop_flat_map(|nodes| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), nodes).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

struct Outcome {
    ids: Vec<InvocationId>,
    activator: RecordingActivator,
    leftover_rows: usize,
}

/// Register every node, then keep completing some activated node (chosen by
/// `choices`) until nothing is left to run.
async fn run_dag(deps: &[BTreeSet<usize>], choices: &[usize]) -> Outcome {
    let prereq_table = MemoryTable::new(PREREQ_TABLE_NAME);
    let successor_table = MemoryTable::new(SUCCESSOR_TABLE_NAME);
    let oracle = StaticStatusOracle::new();
    let manager = PrereqManager::new(prereq_table.clone(), successor_table.clone(), oracle.clone());
    let activator = RecordingActivator::new();
    let ids: Vec<InvocationId> = deps.iter().map(|_| InvocationId::new()).collect();

    for (i, node_deps) in deps.iter().enumerate() {
        let prereqs: Vec<_> = node_deps.iter().map(|d| ids[*d]).collect();
        manager.add_prereq(ids[i], &prereqs, &activator).await.unwrap();
    }

    let mut completed = BTreeSet::new();
    let mut step = 0;
    loop {
        let ready: Vec<InvocationId> = activator
            .activations()
            .into_iter()
            .filter(|id| !completed.contains(id))
            .collect();
        if ready.is_empty() {
            break;
        }
        let pick = ready[choices.get(step).copied().unwrap_or(0) % ready.len()];
        step += 1;

        oracle.set(pick, FunctionStatus::CompletedSuccess);
        completed.insert(pick);
        manager.on_complete(pick, &activator).await.unwrap();
    }

    Outcome {
        ids,
        activator,
        leftover_rows: prereq_table.row_count() + successor_table.row_count(),
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn every_node_is_activated_exactly_once(
        deps in dag_strategy(10),
        choices in proptest::collection::vec(any::<usize>(), 0..32),
    ) {
        let outcome = block_on(run_dag(&deps, &choices));

        for id in &outcome.ids {
            prop_assert_eq!(outcome.activator.count_for(*id), 1);
        }
        prop_assert_eq!(outcome.activator.activations().len(), deps.len());
        prop_assert_eq!(outcome.leftover_rows, 0);
    }

    #[test]
    fn nothing_downstream_of_a_failure_runs(
        deps in dag_strategy(8),
        failed in any::<usize>(),
    ) {
        let failed = failed % deps.len();
        let ids: Vec<InvocationId> = deps.iter().map(|_| InvocationId::new()).collect();
        let oracle = StaticStatusOracle::new();
        let manager = PrereqManager::new(
            MemoryTable::new(PREREQ_TABLE_NAME),
            MemoryTable::new(SUCCESSOR_TABLE_NAME),
            oracle.clone(),
        );
        let activator = RecordingActivator::new();

        block_on(async {
            for (i, node_deps) in deps.iter().enumerate() {
                let prereqs: Vec<_> = node_deps.iter().map(|d| ids[*d]).collect();
                manager.add_prereq(ids[i], &prereqs, &activator).await.unwrap();
            }
            // Run nodes in index order; `failed` fails if it ever runs.
            for (i, id) in ids.iter().enumerate() {
                if activator.count_for(*id) == 0 {
                    continue;
                }
                let status = if i == failed {
                    FunctionStatus::CompletedFailed
                } else {
                    FunctionStatus::CompletedSuccess
                };
                oracle.set(*id, status);
                manager.on_complete(*id, &activator).await.unwrap();
            }
        });

        // Transitive successors of `failed`.
        let mut blocked = BTreeSet::new();
        for (i, node_deps) in deps.iter().enumerate() {
            if node_deps.iter().any(|d| *d == failed || blocked.contains(d)) {
                blocked.insert(i);
            }
        }
        for (i, id) in ids.iter().enumerate() {
            let expected = usize::from(!blocked.contains(&i));
            prop_assert_eq!(activator.count_for(*id), expected);
        }
    }
}
