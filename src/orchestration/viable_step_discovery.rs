//! # Viable Step Discovery
//!
//! Pure readiness analysis over a strand's steps: which steps can run now, which
//! failed steps may be retried, whether the graph is structurally sound, and what
//! an idle strand is waiting for.
//!
//! ## Readiness rule
//!
//! A step is viable when it is `Pending` and every dependency is `Completed`.
//! `Skipped` does not satisfy a dependency, so skipping a step blocks its whole
//! downstream chain.

use crate::error::StuckReason;
use crate::orchestration::backoff::BackoffPolicy;
use crate::orchestration::step::Step;
use crate::state_machine::StepState;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, instrument};

/// A structural defect that prevents a strand from ever finishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphViolation {
    pub reason: StuckReason,
    pub step_ids: Vec<String>,
}

/// What an idle strand (no viable steps) should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleState {
    /// Every step is `Completed` or `Skipped`
    AllSettled,
    /// Failed steps are waiting out their backoff; re-check after the duration
    AwaitingRetry(Duration),
    /// No further progress is possible
    Stuck {
        reason: StuckReason,
        step_ids: Vec<String>,
    },
}

fn states_by_id(steps: &[Step]) -> HashMap<&str, StepState> {
    steps.iter().map(|s| (s.id(), s.state())).collect()
}

/// Ids of the steps that can start now, in declaration order
#[instrument(skip(steps), fields(step_count = steps.len()))]
pub fn find_viable_steps(steps: &[Step]) -> Vec<String> {
    let states = states_by_id(steps);

    let viable: Vec<String> = steps
        .iter()
        .filter(|step| step.state() == StepState::Pending)
        .filter(|step| {
            step.dependencies().iter().all(|dep| {
                states
                    .get(dep.as_str())
                    .is_some_and(StepState::satisfies_dependencies)
            })
        })
        .map(|step| step.id().to_string())
        .collect();

    debug!(viable_steps = viable.len(), "Completed viable step discovery");
    viable
}

/// Failed steps whose backoff has elapsed at `now`
pub fn find_retry_ready_steps(
    steps: &[Step],
    policy: &BackoffPolicy,
    now: DateTime<Utc>,
) -> Vec<String> {
    steps
        .iter()
        .filter(|step| step.is_retry_eligible())
        .filter(|step| next_retry_at(step, policy) <= now)
        .map(|step| step.id().to_string())
        .collect()
}

fn next_retry_at(step: &Step, policy: &BackoffPolicy) -> DateTime<Utc> {
    let failed_at = step.last_failure_at().unwrap_or(DateTime::<Utc>::MIN_UTC);
    policy.next_retry_at(failed_at, step.attempts())
}

/// Classify a strand that has no viable steps
///
/// Pending retries are checked before exhausted failures: a retry still due is
/// possible progress. With no retry due and no exhausted failure, the remaining
/// pending steps wait on dependencies that can never complete.
pub fn classify_idle(steps: &[Step], policy: &BackoffPolicy, now: DateTime<Utc>) -> IdleState {
    if steps.iter().all(|s| s.state().is_settled()) {
        return IdleState::AllSettled;
    }

    let next_retry = steps
        .iter()
        .filter(|s| s.is_retry_eligible())
        .map(|s| next_retry_at(s, policy))
        .min();
    if let Some(next_retry) = next_retry {
        let wait = (next_retry - now).to_std().unwrap_or(Duration::ZERO);
        return IdleState::AwaitingRetry(wait);
    }

    let exhausted: Vec<String> = steps
        .iter()
        .filter(|s| s.has_exhausted_retries())
        .map(|s| s.id().to_string())
        .collect();
    if !exhausted.is_empty() {
        return IdleState::Stuck {
            reason: StuckReason::ExhaustedRetries,
            step_ids: exhausted,
        };
    }

    IdleState::Stuck {
        reason: StuckReason::BlockedDependencies,
        step_ids: steps
            .iter()
            .filter(|s| !s.state().is_settled())
            .map(|s| s.id().to_string())
            .collect(),
    }
}

/// Detect dangling dependency edges and dependency cycles
pub fn validate_graph(steps: &[Step]) -> Result<(), GraphViolation> {
    let known: HashSet<&str> = steps.iter().map(Step::id).collect();

    let dangling: Vec<String> = steps
        .iter()
        .filter(|step| step.dependencies().iter().any(|d| !known.contains(d.as_str())))
        .map(|step| step.id().to_string())
        .collect();
    if !dangling.is_empty() {
        return Err(GraphViolation {
            reason: StuckReason::DanglingDependency,
            step_ids: dangling,
        });
    }

    match find_cycle(steps) {
        Some(cycle) => Err(GraphViolation {
            reason: StuckReason::Cycle,
            step_ids: cycle,
        }),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Iterative DFS; returns the members of the first cycle found
fn find_cycle(steps: &[Step]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = steps.iter().enumerate().map(|(i, s)| (s.id(), i)).collect();
    let edges: Vec<Vec<usize>> = steps
        .iter()
        .map(|s| {
            s.dependencies()
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::Unvisited; steps.len()];
    for root in 0..steps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (node, next edge to explore)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if let Some(&dep) = edges[node].get(frame.1) {
                frame.1 += 1;
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::InProgress => {
                        let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..]
                            .iter()
                            .map(|&(n, _)| steps[n].id().to_string())
                            .collect();
                        cycle.sort();
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::context::{CancellationHandle, Collaborators, StrandContext};
    use crate::orchestration::step::{action_fn, StepError};
    use serde_json::Value;
    use std::sync::Arc;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, "test", id, action_fn(|_, _| async { Ok(Value::Null) }))
            .depends_on(deps.iter().copied())
    }

    fn failing(id: &str, retry_budget: u32) -> Step {
        Step::new(
            id,
            "test",
            id,
            action_fn(|_, _| async { Err(StepError::failed("nope")) }),
        )
        .with_retry_budget(retry_budget)
    }

    fn ctx() -> Arc<StrandContext> {
        Arc::new(StrandContext::new("s", Collaborators::default(), CancellationHandle::new()))
    }

    #[test]
    fn test_roots_are_viable_first() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &[])];
        assert_eq!(find_viable_steps(&steps), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_dependents_become_viable_after_completion() {
        let ctx = ctx();
        let mut steps = vec![step("a", &[]), step("b", &["a"])];
        steps[0].execute(&ctx).await;
        assert_eq!(find_viable_steps(&steps), vec!["b"]);
    }

    #[tokio::test]
    async fn test_skipped_dependency_blocks_dependents() {
        let ctx = ctx();
        let mut steps = vec![
            step("a", &[]).with_condition(|_| false),
            step("b", &["a"]),
        ];
        steps[0].execute(&ctx).await;
        assert_eq!(steps[0].state(), StepState::Skipped);

        assert!(find_viable_steps(&steps).is_empty());
        assert_eq!(
            classify_idle(&steps, &BackoffPolicy::immediate(), Utc::now()),
            IdleState::Stuck {
                reason: StuckReason::BlockedDependencies,
                step_ids: vec!["b".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_idle_classification_order() {
        let ctx = ctx();
        let policy = BackoffPolicy::new(Duration::from_secs(60), 2.0, Duration::from_secs(60));
        let mut steps = vec![failing("a", 1), step("b", &["a"])];
        steps[0].execute(&ctx).await;

        // Retry pending outranks the failure
        match classify_idle(&steps, &policy, Utc::now()) {
            IdleState::AwaitingRetry(wait) => assert!(wait <= Duration::from_secs(60)),
            other => panic!("expected AwaitingRetry, got {other:?}"),
        }
        assert!(find_retry_ready_steps(&steps, &policy, Utc::now()).is_empty());
        assert_eq!(
            find_retry_ready_steps(&steps, &policy, Utc::now() + chrono::Duration::seconds(61)),
            vec!["a"]
        );

        steps[0].reset_for_retry().unwrap();
        steps[0].execute(&ctx).await;
        assert_eq!(
            classify_idle(&steps, &policy, Utc::now()),
            IdleState::Stuck {
                reason: StuckReason::ExhaustedRetries,
                step_ids: vec!["a".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_all_settled() {
        let ctx = ctx();
        let mut steps = vec![step("a", &[]), step("b", &[]).with_condition(|_| false)];
        for s in &mut steps {
            s.execute(&ctx).await;
        }
        assert_eq!(
            classify_idle(&steps, &BackoffPolicy::default(), Utc::now()),
            IdleState::AllSettled
        );
    }

    #[test]
    fn test_dangling_dependency() {
        let steps = vec![step("a", &[]), step("b", &["ghost"])];
        assert_eq!(
            validate_graph(&steps),
            Err(GraphViolation {
                reason: StuckReason::DanglingDependency,
                step_ids: vec!["b".to_string()],
            })
        );
    }

    #[test]
    fn test_cycle_detection() {
        let steps = vec![
            step("root", &[]),
            step("a", &["root", "c"]),
            step("b", &["a"]),
            step("c", &["b"]),
            step("tail", &["c"]),
        ];
        assert_eq!(
            validate_graph(&steps),
            Err(GraphViolation {
                reason: StuckReason::Cycle,
                step_ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            })
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step("a", &["a"])];
        assert_eq!(validate_graph(&steps).unwrap_err().step_ids, vec!["a"]);
    }

    #[test]
    fn test_diamond_is_valid() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        assert!(validate_graph(&steps).is_ok());
    }
}
