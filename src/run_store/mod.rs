//! # Run Store
//!
//! Append-only history of strand executions. A strand writes one `running`
//! record when it starts and one terminal record (`completed`, `failed` or
//! `cancelled`) when it ends; nothing is ever updated in place.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryRunStore`] for tests and embedded use
//! - [`SqliteRunStore`] backed by sqlx, persisting to a `workflow_runs` table

pub mod memory;
pub mod sqlite;

use crate::config::{RunStoreBackend, RunStoreConfig};
use crate::error::{Result, StrandsError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub use memory::InMemoryRunStore;
pub use sqlite::SqliteRunStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StrandsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StrandsError::RunStore(format!("unknown run status '{other}'"))),
        }
    }
}

/// One persisted run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<Value>,
    pub error_message: Option<String>,
}

/// The payload of a `record_run` call
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub results: Option<Value>,
    pub error_message: Option<String>,
}

impl RunUpdate {
    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            started_at: None,
            results: None,
            error_message: None,
        }
    }

    pub fn completed(results: Value) -> Self {
        Self {
            status: RunStatus::Completed,
            started_at: None,
            results: Some(results),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            started_at: None,
            results: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn cancelled(error_message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Cancelled,
            started_at: None,
            results: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Materialize the record this update appends
    pub(crate) fn into_record(self, run_id: String, workflow_id: &str) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            run_id,
            workflow_id: workflow_id.to_string(),
            status: self.status,
            started_at: self.started_at.unwrap_or(now),
            completed_at: self.status.is_terminal().then_some(now),
            results: self.results,
            error_message: self.error_message,
        }
    }
}

/// Durable history of strand runs
#[async_trait]
pub trait RunStore: Send + Sync + fmt::Debug {
    /// Append a run record and return its id
    async fn record_run(&self, workflow_id: &str, update: RunUpdate) -> Result<String>;

    /// Up to `limit` records for `workflow_id`, most recent first
    async fn read_runs(&self, workflow_id: &str, limit: usize) -> Result<Vec<RunRecord>>;
}

/// `run_<YYYYmmdd_HHMMSS>_<8 hex chars>`
pub fn generate_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Build the store selected by configuration
pub async fn from_config(config: &RunStoreConfig) -> Result<Arc<dyn RunStore>> {
    match config.backend {
        RunStoreBackend::Memory => Ok(Arc::new(InMemoryRunStore::new())),
        RunStoreBackend::Sqlite => Ok(Arc::new(SqliteRunStore::connect(config).await?)),
    }
}
