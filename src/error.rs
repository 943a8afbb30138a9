//! Error types for the Strands workflow core.
//!

use crate::state_machine::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a strand could not make further progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckReason {
    /// At least one step failed and used up its retry budget
    ExhaustedRetries,
    /// Pending steps depend on steps that can never complete (skipped or failed)
    BlockedDependencies,
    /// The dependency relation contains a cycle
    Cycle,
    /// A step depends on an id that is not part of the strand
    DanglingDependency,
}

impl fmt::Display for StuckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExhaustedRetries => write!(f, "unresolved failures"),
            Self::BlockedDependencies => write!(f, "blocked dependencies"),
            Self::Cycle => write!(f, "dependency cycle"),
            Self::DanglingDependency => write!(f, "dangling dependency"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrandsError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),
    #[error("Strand {strand_id} is stuck ({reason}) in steps: {step_ids:?}")]
    StuckWorkflow {
        strand_id: String,
        step_ids: Vec<String>,
        reason: StuckReason,
    },
    #[error("Strand {0} was cancelled")]
    Cancelled(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
    #[error("Run store error: {0}")]
    RunStore(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StrandsError {
    /// Step ids implicated by a stuck workflow, empty for every other error
    pub fn implicated_steps(&self) -> &[String] {
        match self {
            Self::StuckWorkflow { step_ids, .. } => step_ids,
            _ => &[],
        }
    }

    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::StuckWorkflow { .. })
    }
}

impl From<sqlx::Error> for StrandsError {
    fn from(error: sqlx::Error) -> Self {
        StrandsError::RunStore(error.to_string())
    }
}

impl From<serde_json::Error> for StrandsError {
    fn from(error: serde_json::Error) -> Self {
        StrandsError::RunStore(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for StrandsError {
    fn from(error: config::ConfigError) -> Self {
        StrandsError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StrandsError>;
