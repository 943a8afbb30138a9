use super::{generate_run_id, RunRecord, RunStore, RunUpdate};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

/// Run store kept in process memory, in insertion order
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    records: RwLock<Vec<RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn record_run(&self, workflow_id: &str, update: RunUpdate) -> Result<String> {
        let run_id = generate_run_id();
        let record = update.into_record(run_id.clone(), workflow_id);
        debug!(run_id = %run_id, workflow_id, status = %record.status, "Recorded workflow run");
        self.records.write().push(record);
        Ok(run_id)
    }

    async fn read_runs(&self, workflow_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| r.workflow_id == workflow_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_store::RunStatus;

    #[tokio::test]
    async fn test_reads_newest_first_per_workflow() {
        let store = InMemoryRunStore::new();
        store.record_run("wf_a", RunUpdate::running()).await.unwrap();
        store.record_run("wf_b", RunUpdate::running()).await.unwrap();
        store
            .record_run("wf_a", RunUpdate::failed("Workflow failed: boom"))
            .await
            .unwrap();

        let runs = store.read_runs("wf_a", 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[1].status, RunStatus::Running);

        assert_eq!(store.read_runs("wf_a", 1).await.unwrap().len(), 1);
        assert!(store.read_runs("missing", 10).await.unwrap().is_empty());
        assert_eq!(store.len(), 3);
    }
}
