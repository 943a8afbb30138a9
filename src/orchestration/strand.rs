//! # Strand Execution Engine
//!
//! Drives one strand's dependency graph to completion.
//!
//! ## Main loop
//!
//! 1. Stop if cancellation was requested.
//! 2. Return failed steps whose backoff has elapsed to `Pending`.
//! 3. Discover the viable set (pending steps whose dependencies all completed).
//! 4. If nothing is viable, classify the idle strand: finished, waiting for a
//!    retry (bounded wait, woken early by cancellation) or stuck.
//! 5. Otherwise run the whole wave concurrently, record every payload under
//!    `results.<step_id>` and go back to 1.
//!
//! Step failures never abort the loop. Independent branches keep running and
//! the strand only fails once nothing else can make progress.
//!
//! Every execution writes exactly two run records: `running` at start and one
//! terminal record. Run store failures are logged and never change the outcome.

use crate::config::StrandsConfig;
use crate::constants::context_keys;
use crate::error::{Result, StrandsError, StuckReason};
use crate::logging::{log_error, log_step_operation, log_strand_operation};
use crate::orchestration::backoff::BackoffPolicy;
use crate::orchestration::context::{CancellationHandle, Collaborators, StrandContext};
use crate::orchestration::step::Step;
use crate::orchestration::types::{StepOutcome, StrandResult, StrandStatusSnapshot};
use crate::orchestration::viable_step_discovery::{
    classify_idle, find_retry_ready_steps, find_viable_steps, validate_graph, IdleState,
};
use crate::run_store::{RunStore, RunUpdate};
use crate::state_machine::{strand_transition, StepState, StrandEvent, StrandState};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Live status of a strand, shared between the strand and the orchestrator
#[derive(Debug)]
pub struct StrandProgress {
    strand_id: String,
    name: String,
    target_controls: Vec<String>,
    total_steps: usize,
    status: RwLock<StrandState>,
    completed_steps: AtomicUsize,
    errors: RwLock<Vec<String>>,
    cancellation: CancellationHandle,
}

impl StrandProgress {
    pub fn strand_id(&self) -> &str {
        &self.strand_id
    }

    pub fn status(&self) -> StrandState {
        *self.status.read()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.read().clone()
    }

    /// Fraction of steps currently `Completed`
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps.load(Ordering::Acquire) as f64 / self.total_steps as f64
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) -> bool {
        self.cancellation.cancel()
    }

    pub fn snapshot(&self) -> StrandStatusSnapshot {
        StrandStatusSnapshot {
            strand_id: self.strand_id.clone(),
            name: self.name.clone(),
            status: self.status(),
            progress: self.progress(),
            target_controls: self.target_controls.clone(),
            errors: self.errors(),
        }
    }

    fn push_error(&self, message: String) {
        self.errors.write().push(message);
    }
}

/// A workflow instance: a DAG of steps sharing one context
pub struct Strand {
    id: String,
    name: String,
    template: Option<String>,
    description: String,
    target_controls: Vec<String>,
    steps: Vec<Step>,
    context: Arc<StrandContext>,
    run_store: Arc<dyn RunStore>,
    backoff: BackoffPolicy,
    idle_wait: Duration,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    progress: Arc<StrandProgress>,
}

impl fmt::Debug for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strand")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("template", &self.template)
            .field("status", &self.status())
            .field("steps", &self.steps)
            .finish()
    }
}

impl Strand {
    /// Build a strand from an ordered step list
    ///
    /// Rejects invalid configuration, duplicate step ids and graphs larger
    /// than `execution.max_workflow_steps`. Dependency defects are reported when
    /// execution starts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        target_controls: Vec<String>,
        mut steps: Vec<Step>,
        collaborators: Collaborators,
        run_store: Arc<dyn RunStore>,
        config: &StrandsConfig,
    ) -> Result<Self> {
        config.validate()?;
        let id = id.into();
        let name = name.into();

        if steps.len() > config.execution.max_workflow_steps {
            return Err(StrandsError::Validation(format!(
                "Strand {id} has {} steps, more than the maximum of {}",
                steps.len(),
                config.execution.max_workflow_steps
            )));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id().to_string()) {
                return Err(StrandsError::Validation(format!(
                    "Duplicate step id '{}' in strand {id}",
                    step.id()
                )));
            }
        }

        let default_timeout = config.execution.default_step_timeout();
        for step in &mut steps {
            step.apply_default_timeout(default_timeout);
        }

        let cancellation = CancellationHandle::new();
        let progress = Arc::new(StrandProgress {
            strand_id: id.clone(),
            name: name.clone(),
            target_controls: target_controls.clone(),
            total_steps: steps.len(),
            status: RwLock::new(StrandState::Pending),
            completed_steps: AtomicUsize::new(0),
            errors: RwLock::new(Vec::new()),
            cancellation: cancellation.clone(),
        });

        Ok(Self {
            context: Arc::new(StrandContext::new(id.clone(), collaborators, cancellation)),
            id,
            name,
            template: None,
            description: description.into(),
            target_controls,
            steps,
            run_store,
            backoff: BackoffPolicy::from_config(&config.backoff),
            idle_wait: config.execution.idle_wait(),
            created_at: Utc::now(),
            completed_at: None,
            progress,
        })
    }

    /// Record the template this strand was built from
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn target_controls(&self) -> &[String] {
        &self.target_controls
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == step_id)
    }

    pub fn status(&self) -> StrandState {
        self.progress.status()
    }

    pub fn errors(&self) -> Vec<String> {
        self.progress.errors()
    }

    pub fn context(&self) -> &Arc<StrandContext> {
        &self.context
    }

    pub fn progress(&self) -> Arc<StrandProgress> {
        self.progress.clone()
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.context.cancellation().clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    fn transition(&self, event: StrandEvent) -> Result<()> {
        let mut status = self.progress.status.write();
        *status = strand_transition(*status, &event)?;
        Ok(())
    }

    /// Execute the strand once
    ///
    /// Returns the aggregate result when every step is `Completed` or `Skipped`.
    /// A stuck graph returns [`StrandsError::StuckWorkflow`], a cancelled run
    /// [`StrandsError::Cancelled`]. Either way a terminal run record is written.
    #[instrument(skip(self), fields(strand_id = %self.id, name = %self.name))]
    pub async fn execute(&mut self) -> Result<StrandResult> {
        if self.status() != StrandState::Pending {
            return Err(StrandsError::InvalidState(format!(
                "Strand {} cannot execute from status {}",
                self.id,
                self.status()
            )));
        }

        let started_at = Utc::now();
        self.initialize_context(started_at);
        self.transition(StrandEvent::Start)?;

        log_strand_operation("execute", &self.id, self.template.as_deref(), "running", None);
        self.record_run(RunUpdate::running().started_at(started_at))
            .await;

        let outcome = self.drive().await;
        self.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                self.finish(StrandEvent::Complete);
                let result = self.result();
                let payload = serde_json::to_value(&result).unwrap_or_else(|e| {
                    warn!(strand_id = %self.id, error = %e, "Failed to serialize strand result");
                    Value::Null
                });
                self.record_run(RunUpdate::completed(payload).started_at(started_at))
                    .await;
                log_strand_operation("execute", &self.id, self.template.as_deref(), "completed", None);
                Ok(result)
            }
            Err(StrandsError::Cancelled(id)) => {
                self.finish(StrandEvent::Cancel);
                self.record_run(
                    RunUpdate::cancelled(format!("Workflow cancelled: strand {id}"))
                        .started_at(started_at),
                )
                .await;
                log_strand_operation("execute", &self.id, self.template.as_deref(), "cancelled", None);
                Err(StrandsError::Cancelled(id))
            }
            Err(error) => {
                let message = format!("Workflow failed: {error}");
                self.finish(StrandEvent::Fail(message.clone()));
                self.record_run(RunUpdate::failed(message.clone()).started_at(started_at))
                    .await;
                log_strand_operation(
                    "execute",
                    &self.id,
                    self.template.as_deref(),
                    "failed",
                    Some(&message),
                );
                Err(error)
            }
        }
    }

    fn finish(&self, event: StrandEvent) {
        if let Err(e) = self.transition(event) {
            warn!(strand_id = %self.id, error = %e, "Unexpected strand transition");
        }
    }

    fn initialize_context(&self, started_at: DateTime<Utc>) {
        self.context.insert(context_keys::STRAND_ID, json!(self.id));
        self.context
            .insert(context_keys::TARGET_CONTROLS, json!(self.target_controls));
        self.context
            .insert(context_keys::START_TIME, json!(started_at.to_rfc3339()));
        self.context.insert(context_keys::RESULTS, json!({}));
        self.context.insert(context_keys::ERRORS, json!([]));
    }

    async fn record_run(&self, update: RunUpdate) {
        let status = update.status;
        if let Err(e) = self.run_store.record_run(&self.id, update).await {
            log_error(
                "strand",
                "record_run",
                &e.to_string(),
                Some(&format!("strand_id={} status={status}", self.id)),
            );
        }
    }

    async fn drive(&mut self) -> Result<()> {
        if let Err(violation) = validate_graph(&self.steps) {
            return Err(self.stuck(violation.reason, violation.step_ids));
        }

        loop {
            if self.context.cancellation().is_cancelled() {
                info!(strand_id = %self.id, "Cancellation requested - abandoning remaining steps");
                return Err(StrandsError::Cancelled(self.id.clone()));
            }

            self.promote_retries();

            let viable = find_viable_steps(&self.steps);
            if viable.is_empty() {
                match classify_idle(&self.steps, &self.backoff, Utc::now()) {
                    IdleState::AllSettled => return Ok(()),
                    IdleState::AwaitingRetry(until_next_retry) => {
                        let wait = until_next_retry.min(self.idle_wait);
                        debug!(strand_id = %self.id, wait_ms = wait.as_millis() as u64, "Waiting for retry backoff");
                        self.idle(wait).await;
                    }
                    IdleState::Stuck { reason, step_ids } => {
                        return Err(self.stuck(reason, step_ids));
                    }
                }
                continue;
            }

            self.run_wave(&viable).await;
        }
    }

    fn stuck(&self, reason: StuckReason, step_ids: Vec<String>) -> StrandsError {
        warn!(strand_id = %self.id, %reason, ?step_ids, "Strand cannot make progress");
        StrandsError::StuckWorkflow {
            strand_id: self.id.clone(),
            step_ids,
            reason,
        }
    }

    async fn idle(&self, wait: Duration) {
        let cancellation = self.context.cancellation().clone();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancellation.cancelled() => {}
        }
    }

    fn promote_retries(&mut self) {
        let ready = find_retry_ready_steps(&self.steps, &self.backoff, Utc::now());
        for step in self.steps.iter_mut().filter(|s| ready.iter().any(|id| id == s.id())) {
            match step.reset_for_retry() {
                Ok(()) => log_step_operation(
                    "retry",
                    &self.id,
                    step.id(),
                    step.attempts() + 1,
                    "pending",
                    None,
                ),
                Err(e) => warn!(strand_id = %self.id, step_id = %step.id(), error = %e, "Retry rejected"),
            }
        }
    }

    async fn run_wave(&mut self, viable: &[String]) {
        let wave: HashSet<&str> = viable.iter().map(String::as_str).collect();
        debug!(strand_id = %self.id, wave = ?viable, "Executing ready wave");

        let context = self.context.clone();
        let payloads: Vec<(String, Value)> = join_all(
            self.steps
                .iter_mut()
                .filter(|step| wave.contains(step.id()))
                .map(|step| {
                    let context = context.clone();
                    async move {
                        let payload = step.execute(&context).await;
                        (step.id().to_string(), payload)
                    }
                }),
        )
        .await;

        for (step_id, payload) in payloads {
            self.context.record_result(&step_id, payload);
        }

        let mut writers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for step in self.steps.iter().filter(|s| wave.contains(s.id())) {
            log_step_operation(
                "execute",
                &self.id,
                step.id(),
                step.attempts(),
                &step.state().to_string(),
                step.error(),
            );

            if step.state() == StepState::Failed {
                let message = format!("Step {}: {}", step.id(), step.error().unwrap_or("unknown error"));
                self.context.push_error(&message);
                self.progress.push_error(message);
            }

            for key in step.context_writes() {
                writers.entry(key.as_str()).or_default().push(step.id());
            }
        }

        for (key, step_ids) in writers.into_iter().filter(|(_, ids)| ids.len() > 1) {
            let message = format!(
                "Context key '{key}' written concurrently by steps [{}]",
                step_ids.join(", ")
            );
            warn!(strand_id = %self.id, key, ?step_ids, "Context key collision within one wave");
            self.context.push_error(&message);
            self.progress.push_error(message);
        }

        let completed = self
            .steps
            .iter()
            .filter(|s| s.state() == StepState::Completed)
            .count();
        self.progress.completed_steps.store(completed, Ordering::Release);
    }

    /// Aggregate result reflecting the strand's current state
    pub fn result(&self) -> StrandResult {
        StrandResult {
            strand_id: self.id.clone(),
            name: self.name.clone(),
            status: self.status(),
            target_controls: self.target_controls.clone(),
            step_results: self
                .steps
                .iter()
                .map(|s| (s.id().to_string(), StepOutcome::from(s)))
                .collect(),
            context: self.context.snapshot(),
            errors: self.errors(),
            completed_at: self.completed_at,
            duration_seconds: self
                .completed_at
                .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0),
        }
    }
}
