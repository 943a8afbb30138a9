//! # Step
//!
//! A single schedulable unit of work inside a strand.
//!
//! ## Execution contract
//!
//! [`Step::execute`] never returns an error. A skipped condition, a timeout, an
//! action error, a panic and cancellation all end up in the step's state and in
//! the returned payload, so the strand driver can decide what to do next without
//! unwinding through it.
//!
//! Retries are not performed here. The strand driver promotes an eligible
//! failed step back to `Pending` and calls `execute` again.

use crate::compliance::ComplianceError;
use crate::constants::system::DEFAULT_STEP_TIMEOUT_SECONDS;
use crate::orchestration::context::{ContextMap, StepContext, StrandContext};
use crate::state_machine::{step_transition, StateMachineResult, StepEvent, StepState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors a step action may return
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),
    #[error("{0} not provided in workflow context")]
    MissingCollaborator(&'static str),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error(transparent)]
    Compliance(#[from] ComplianceError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// The work a step performs
///
/// Implementations read and write the strand context through `ctx` and receive
/// the step's declared parameters. Returned values become the step's result.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn invoke(&self, ctx: &StepContext, params: &ContextMap) -> Result<Value, StepError>;
}

/// Adapter turning an async closure into a [`StepAction`]
pub struct FnAction<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnAction<F, Fut>
where
    F: Fn(StepContext, ContextMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> StepAction for FnAction<F, Fut>
where
    F: Fn(StepContext, ContextMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepError>> + Send,
{
    async fn invoke(&self, ctx: &StepContext, params: &ContextMap) -> Result<Value, StepError> {
        (self.f)(ctx.clone(), params.clone()).await
    }
}

/// Wrap an async closure as a shareable step action
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn StepAction>
where
    F: Fn(StepContext, ContextMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    Arc::new(FnAction::new(f))
}

/// Skip predicate evaluated against the shared context; `false` skips the step
pub type StepCondition = Arc<dyn Fn(&ContextMap) -> bool + Send + Sync>;

enum AttemptOutcome {
    Completed(Value),
    Failed(String),
    Cancelled,
}

/// A node of the strand's dependency graph together with its execution state
pub struct Step {
    id: String,
    step_type: String,
    description: String,
    action: Arc<dyn StepAction>,
    parameters: ContextMap,
    dependencies: BTreeSet<String>,
    condition: Option<StepCondition>,
    retry_budget: u32,
    timeout: Option<Duration>,

    state: StepState,
    result: Option<Value>,
    error: Option<String>,
    attempts: u32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    context_writes: Vec<String>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("step_type", &self.step_type)
            .field("dependencies", &self.dependencies)
            .field("has_condition", &self.condition.is_some())
            .field("retry_budget", &self.retry_budget)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("error", &self.error)
            .finish()
    }
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        step_type: impl Into<String>,
        description: impl Into<String>,
        action: Arc<dyn StepAction>,
    ) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            description: description.into(),
            action,
            parameters: ContextMap::new(),
            dependencies: BTreeSet::new(),
            condition: None,
            retry_budget: 0,
            timeout: None,
            state: StepState::Pending,
            result: None,
            error: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
            last_failure_at: None,
            context_writes: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: ContextMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ContextMap) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use `timeout` unless the step was given one explicitly
    pub(crate) fn apply_default_timeout(&mut self, timeout: Duration) {
        self.timeout.get_or_insert(timeout);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &ContextMap {
        &self.parameters
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or(Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECONDS))
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }

    /// Context keys written during the most recent attempt
    pub fn context_writes(&self) -> &[String] {
        &self.context_writes
    }

    /// One initial attempt plus `retry_budget` retries
    pub fn max_attempts(&self) -> u32 {
        self.retry_budget.saturating_add(1)
    }

    /// Failed with attempts left
    pub fn is_retry_eligible(&self) -> bool {
        self.state == StepState::Failed && self.attempts < self.max_attempts()
    }

    /// Failed with no attempts left
    pub fn has_exhausted_retries(&self) -> bool {
        self.state == StepState::Failed && self.attempts >= self.max_attempts()
    }

    fn apply(&mut self, event: StepEvent) -> StateMachineResult<()> {
        self.state = step_transition(self.state, &event)?;
        Ok(())
    }

    /// Move an eligible failed step back to `Pending` for another attempt
    pub fn reset_for_retry(&mut self) -> StateMachineResult<()> {
        self.apply(StepEvent::Retry)?;
        self.context_writes.clear();
        debug!(
            step_id = %self.id,
            attempts = self.attempts,
            max_attempts = self.max_attempts(),
            "Step reset for retry"
        );
        Ok(())
    }

    /// Run one attempt of this step against the strand context
    pub async fn execute(&mut self, ctx: &Arc<StrandContext>) -> Value {
        if let Some(condition) = &self.condition {
            let evaluated = std::panic::catch_unwind(AssertUnwindSafe(|| ctx.read(|data| condition(data))));
            let should_run = match evaluated {
                Ok(should_run) => should_run,
                Err(panic) => {
                    let message = format!("Step condition panicked: {}", panic_message(&*panic));
                    if let Err(e) = self.apply(StepEvent::Start) {
                        return json!({"status": "error", "error": e.to_string()});
                    }
                    self.attempts += 1;
                    self.started_at = Some(Utc::now());
                    self.context_writes.clear();
                    return self.record_failure(ctx.strand_id(), message);
                }
            };
            if !should_run {
                return match self.apply(StepEvent::Skip) {
                    Ok(()) => {
                        self.completed_at = Some(Utc::now());
                        info!(step_id = %self.id, strand_id = %ctx.strand_id(), "Step skipped due to condition");
                        let payload = json!({"status": "skipped", "message": "Condition not met"});
                        self.result = Some(payload.clone());
                        payload
                    }
                    Err(e) => json!({"status": "error", "error": e.to_string()}),
                };
            }
        }

        if let Err(e) = self.apply(StepEvent::Start) {
            warn!(step_id = %self.id, error = %e, "Step cannot start from its current state");
            return json!({"status": "error", "error": e.to_string()});
        }
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.context_writes.clear();

        let timeout = self.timeout();
        let step_ctx = StepContext::new(ctx.clone(), &self.id);
        let action = self.action.clone();
        let cancellation = ctx.cancellation().clone();

        debug!(
            step_id = %self.id,
            strand_id = %ctx.strand_id(),
            attempt = self.attempts,
            timeout_ms = timeout.as_millis() as u64,
            "Invoking step action"
        );

        let outcome = {
            let invocation = AssertUnwindSafe(action.invoke(&step_ctx, &self.parameters)).catch_unwind();
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => AttemptOutcome::Cancelled,
                attempt = tokio::time::timeout(timeout, invocation) => match attempt {
                    Err(_) => AttemptOutcome::Failed(format!("Step timed out after {timeout:?}")),
                    Ok(Err(panic)) => AttemptOutcome::Failed(format!("Step panicked: {}", panic_message(&*panic))),
                    Ok(Ok(Err(e))) => AttemptOutcome::Failed(e.to_string()),
                    Ok(Ok(Ok(value))) => AttemptOutcome::Completed(value),
                },
            }
        };
        self.context_writes = step_ctx.written_keys();

        match outcome {
            AttemptOutcome::Completed(value) => {
                if let Err(e) = self.apply(StepEvent::Complete) {
                    return json!({"status": "error", "error": e.to_string()});
                }
                self.completed_at = Some(Utc::now());
                self.error = None;
                self.result = Some(value.clone());
                info!(step_id = %self.id, strand_id = %ctx.strand_id(), attempt = self.attempts, "Step completed successfully");
                value
            }
            AttemptOutcome::Failed(message) => self.record_failure(ctx.strand_id(), message),
            AttemptOutcome::Cancelled => {
                self.record_failure(ctx.strand_id(), "Step cancelled".to_string())
            }
        }
    }

    fn record_failure(&mut self, strand_id: &str, message: String) -> Value {
        let now = Utc::now();
        if let Err(e) = self.apply(StepEvent::fail_with_error(message.clone())) {
            return json!({"status": "error", "error": e.to_string()});
        }
        self.completed_at = None;
        self.last_failure_at = Some(now);
        self.error = Some(message.clone());

        let payload = json!({"status": "error", "error": message});
        self.result = Some(payload.clone());
        error!(
            step_id = %self.id,
            strand_id = %strand_id,
            attempt = self.attempts,
            max_attempts = self.max_attempts(),
            error = %message,
            "Step failed"
        );
        payload
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
