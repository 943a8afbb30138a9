//! # Orchestration Types
//!
//! Result and status shapes returned to callers of the strand engine and the
//! orchestrator.

use crate::orchestration::context::ContextMap;
use crate::orchestration::step::Step;
use crate::state_machine::{StepState, StrandState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extra keyword arguments passed to a template builder (`baseline`, `family`, ...)
pub type TemplateArgs = BTreeMap<String, Value>;

/// Final per-step outcome reported in a [`StrandResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepState,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Step> for StepOutcome {
    fn from(step: &Step) -> Self {
        Self {
            status: step.state(),
            result: step.result().cloned(),
            error: step.error().map(str::to_string),
            attempts: step.attempts(),
            started_at: step.started_at(),
            completed_at: step.completed_at(),
        }
    }
}

/// Aggregate result of a completed strand
///
/// A `Completed` strand may still contain failed-then-recovered or skipped
/// steps; inspect `step_results` to see how each step ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandResult {
    pub strand_id: String,
    pub name: String,
    pub status: StrandState,
    pub target_controls: Vec<String>,
    pub step_results: BTreeMap<String, StepOutcome>,
    pub context: ContextMap,
    pub errors: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl StrandResult {
    /// Steps that ended in a given state
    pub fn steps_in_state(&self, state: StepState) -> Vec<&str> {
        self.step_results
            .iter()
            .filter(|(_, outcome)| outcome.status == state)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Point-in-time view of an active strand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandStatusSnapshot {
    pub strand_id: String,
    pub name: String,
    pub status: StrandState,
    /// Fraction of steps currently `Completed`, in `[0, 1]`
    pub progress: f64,
    pub target_controls: Vec<String>,
    pub errors: Vec<String>,
}

/// Public description of a registered template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
}
