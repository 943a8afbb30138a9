use proptest::prelude::*;

/// A random DAG as dependency lists: node `i` depends only on nodes `< i`
#[derive(Debug, Clone)]
pub struct DagShape {
    pub dependencies: Vec<Vec<usize>>,
}

impl DagShape {
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn step_id(index: usize) -> String {
        format!("step_{index:02}")
    }
}

/// Strategy for generating acyclic dependency graphs of 1 to `max_nodes` nodes
pub fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = DagShape> {
    (1..=max_nodes).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(any::<bool>(), n), n).prop_map(
            move |matrix| DagShape {
                dependencies: (0..n)
                    .map(|i| (0..i).filter(|&j| matrix[i][j]).collect())
                    .collect(),
            },
        )
    })
}
