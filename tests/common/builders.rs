//! Step and strand builders shared by the integration tests.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strands_core::compliance::StaticCatalog;
use strands_core::logging::init_structured_logging;
use strands_core::orchestration::{action_fn, Collaborators, Step, StepError, Strand};
use strands_core::run_store::{InMemoryRunStore, RunStore};
use strands_core::StrandsConfig;
use uuid::Uuid;

/// Configuration with millisecond backoff so retry tests finish quickly
pub fn fast_config() -> StrandsConfig {
    let mut config = StrandsConfig::default();
    config.backoff.base_delay_ms = 5;
    config.backoff.max_delay_ms = 20;
    config.execution.idle_wait_ms = 50;
    config
}

pub fn memory_store() -> Arc<InMemoryRunStore> {
    Arc::new(InMemoryRunStore::new())
}

pub fn build_strand(steps: Vec<Step>, run_store: Arc<dyn RunStore>) -> Strand {
    build_strand_with(steps, run_store, Collaborators::default())
}

pub fn build_strand_with(
    steps: Vec<Step>,
    run_store: Arc<dyn RunStore>,
    collaborators: Collaborators,
) -> Strand {
    init_structured_logging();
    Strand::new(
        format!("strand_test_{}", Uuid::new_v4().simple()),
        "Test Strand",
        "integration test strand",
        vec!["AC-1".to_string()],
        steps,
        collaborators,
        run_store,
        &fast_config(),
    )
    .expect("valid strand")
}

pub fn value_step(id: &str, value: Value) -> Step {
    Step::new(
        id,
        "test",
        format!("returns {value}"),
        action_fn(move |_, _| {
            let value = value.clone();
            async move { Ok(value) }
        }),
    )
}

pub fn noop_step(id: &str) -> Step {
    value_step(id, json!({"step": id}))
}

pub fn failing_step(id: &str, message: &'static str) -> Step {
    Step::new(
        id,
        "test",
        "always fails",
        action_fn(move |_, _| async move { Err(StepError::failed(message)) }),
    )
}

pub fn sleeping_step(id: &str, duration: Duration) -> Step {
    Step::new(
        id,
        "test",
        "sleeps",
        action_fn(move |_, _| async move {
            tokio::time::sleep(duration).await;
            Ok(json!({"slept_ms": duration.as_millis() as u64}))
        }),
    )
}

/// Fails `failures` times, then succeeds; `calls` counts every invocation
pub fn flaky_step(id: &str, failures: u32, calls: Arc<AtomicU32>) -> Step {
    Step::new(
        id,
        "test",
        "fails then succeeds",
        action_fn(move |_, _| {
            let calls = calls.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= failures {
                    Err(StepError::failed(format!("transient failure {call}")))
                } else {
                    Ok(json!({"succeeded_on": call}))
                }
            }
        }),
    )
}

/// Appends its id to `log` when it runs
pub fn recording_step(id: &str, log: Arc<Mutex<Vec<String>>>) -> Step {
    let step_id = id.to_string();
    Step::new(
        id,
        "test",
        "records execution order",
        action_fn(move |_, _| {
            let log = log.clone();
            let step_id = step_id.clone();
            async move {
                log.lock().push(step_id);
                Ok(Value::Null)
            }
        }),
    )
}

pub fn controls(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn moderate_catalog() -> Arc<StaticCatalog> {
    Arc::new(
        StaticCatalog::default()
            .with_baseline("low", ["AC-1", "AU-1"])
            .with_baseline("moderate", ["AC-1", "AC-2", "AU-1", "AU-2", "CM-2"])
            .with_baseline("high", ["AC-1", "AC-2", "AC-3", "AU-1", "AU-2", "CM-2", "SC-7"]),
    )
}
