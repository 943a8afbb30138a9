//! SQLite-backed run store.
//!
//! The `workflow_runs` table is created on connect. `seq` preserves insertion
//! order so that history reads are newest first even when several records share
//! a timestamp.

use super::{generate_run_id, RunRecord, RunStatus, RunStore, RunUpdate};
use crate::config::RunStoreConfig;
use crate::error::{Result, StrandsError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};

const CREATE_WORKFLOW_RUNS: &str = r#"
    CREATE TABLE IF NOT EXISTS workflow_runs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        workflow_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        results TEXT,
        error_message TEXT
    )
"#;

const CREATE_WORKFLOW_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_workflow_runs_workflow ON workflow_runs(workflow_id)";

#[derive(Debug, FromRow)]
struct WorkflowRunRow {
    id: String,
    workflow_id: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    results: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<WorkflowRunRow> for RunRecord {
    type Error = StrandsError;

    fn try_from(row: WorkflowRunRow) -> Result<Self> {
        let results = row
            .results
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(RunRecord {
            run_id: row.id,
            workflow_id: row.workflow_id,
            status: RunStatus::from_str(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            results,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Connect using run store configuration and ensure the schema exists
    pub async fn connect(config: &RunStoreConfig) -> Result<Self> {
        let in_memory = config.database_url.contains(":memory:");
        // Every connection to an in-memory database sees its own empty database
        let max_connections = if in_memory { 1 } else { config.max_connections.max(1) };

        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        info!(
            database_url = %config.database_url,
            max_connections,
            "Run store connected"
        );
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_WORKFLOW_RUNS).execute(&pool).await?;
        sqlx::query(CREATE_WORKFLOW_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn record_run(&self, workflow_id: &str, update: RunUpdate) -> Result<String> {
        let run_id = generate_run_id();
        let record = update.into_record(run_id.clone(), workflow_id);
        let results = record
            .results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO workflow_runs (
                id, workflow_id, status, started_at, completed_at, results, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.run_id)
        .bind(&record.workflow_id)
        .bind(record.status.as_str())
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(results)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        debug!(run_id = %run_id, workflow_id, status = %record.status, "Recorded workflow run");
        Ok(run_id)
    }

    async fn read_runs(&self, workflow_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            SELECT id, workflow_id, status, started_at, completed_at, results, error_message
            FROM workflow_runs
            WHERE workflow_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunStoreBackend;
    use serde_json::json;

    fn memory_config() -> RunStoreConfig {
        RunStoreConfig {
            backend: RunStoreBackend::Sqlite,
            database_url: "sqlite::memory:".to_string(),
            max_connections: 4,
        }
    }

    #[tokio::test]
    async fn test_round_trip_in_memory() {
        let store = SqliteRunStore::connect(&memory_config()).await.unwrap();

        store.record_run("strand_x", RunUpdate::running()).await.unwrap();
        let run_id = store
            .record_run("strand_x", RunUpdate::completed(json!({"steps": 4})))
            .await
            .unwrap();

        let runs = store.read_runs("strand_x", 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, run_id);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].results, Some(json!({"steps": 4})));
        assert!(runs[0].completed_at.is_some());
        assert_eq!(runs[1].status, RunStatus::Running);
        assert!(runs[1].completed_at.is_none());
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("runs.db").display());
        let config = RunStoreConfig {
            database_url: url,
            ..memory_config()
        };

        {
            let store = SqliteRunStore::connect(&config).await.unwrap();
            store
                .record_run("strand_y", RunUpdate::failed("Workflow failed: stuck in [a]"))
                .await
                .unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteRunStore::connect(&config).await.unwrap();
        let runs = reopened.read_runs("strand_y", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error_message.as_deref(), Some("Workflow failed: stuck in [a]"));
    }
}
