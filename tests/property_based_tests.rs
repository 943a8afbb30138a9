mod common;

use common::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use strands_core::orchestration::{find_viable_steps, validate_graph, Step};
use strands_core::StrandState;

fn build_steps(shape: &DagShape, log: &Arc<Mutex<Vec<String>>>) -> Vec<Step> {
    (0..shape.len())
        .map(|i| {
            recording_step(&DagShape::step_id(i), log.clone())
                .depends_on(shape.dependencies[i].iter().map(|&j| DagShape::step_id(j)))
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: generated graphs always pass validation
    #[test]
    fn generated_dags_are_valid(shape in dag_strategy(12)) {
        let steps = build_steps(&shape, &Arc::new(Mutex::new(Vec::new())));
        prop_assert!(validate_graph(&steps).is_ok());
    }

    /// Property: the first ready set is exactly the steps without dependencies
    #[test]
    fn initial_ready_set_is_the_roots(shape in dag_strategy(12)) {
        let steps = build_steps(&shape, &Arc::new(Mutex::new(Vec::new())));
        let mut expected: Vec<String> = (0..shape.len())
            .filter(|&i| shape.dependencies[i].is_empty())
            .map(DagShape::step_id)
            .collect();
        let mut viable = find_viable_steps(&steps);
        expected.sort();
        viable.sort();
        prop_assert_eq!(viable, expected);
    }

    /// Property: every step runs exactly once and after all of its dependencies
    #[test]
    fn execution_respects_dependency_order(shape in dag_strategy(10)) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut strand = build_strand(build_steps(&shape, &log), memory_store());

        let result = runtime().block_on(strand.execute());
        prop_assert!(result.is_ok());
        prop_assert_eq!(strand.status(), StrandState::Completed);

        let order = log.lock().clone();
        prop_assert_eq!(order.len(), shape.len());
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(pos, id)| (id.as_str(), pos)).collect();
        for (i, dependencies) in shape.dependencies.iter().enumerate() {
            let step_position = position[DagShape::step_id(i).as_str()];
            for &j in dependencies {
                prop_assert!(position[DagShape::step_id(j).as_str()] < step_position);
            }
        }
    }
}
