//! Evidence items collected per control.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Policy,
    Procedure,
    Screenshot,
    Log,
    Configuration,
    Documentation,
    Interview,
    TestResult,
    ToolOutput,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Pending,
    #[default]
    Collected,
    Reviewed,
    Approved,
    Rejected,
}

impl EvidenceStatus {
    /// Rejected or not yet collected evidence does not support a control
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Collected | Self::Reviewed | Self::Approved)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: Uuid,
    pub control_id: String,
    pub evidence_type: EvidenceType,
    pub content: Value,
    pub description: String,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub status: EvidenceStatus,
}

impl EvidenceItem {
    pub fn new(control_id: &str, evidence_type: EvidenceType, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            control_id: control_id.to_uppercase(),
            evidence_type,
            content,
            description: String::new(),
            source: String::new(),
            collected_at: Utc::now(),
            status: EvidenceStatus::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_status(mut self, status: EvidenceStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub total_controls: usize,
    pub total_evidence_items: usize,
    pub status_breakdown: BTreeMap<String, usize>,
}

/// Thread-safe evidence collection keyed by control id
#[derive(Debug, Default)]
pub struct EvidenceStore {
    items: DashMap<String, Vec<EvidenceItem>>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_evidence(&self, item: EvidenceItem) -> Uuid {
        let id = item.id;
        self.items.entry(item.control_id.clone()).or_default().push(item);
        id
    }

    pub fn evidence_for_control(&self, control_id: &str) -> Vec<EvidenceItem> {
        self.items
            .get(&control_id.to_uppercase())
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// Number of usable evidence items for a control
    pub fn usable_count(&self, control_id: &str) -> usize {
        self.items
            .get(&control_id.to_uppercase())
            .map(|items| items.iter().filter(|i| i.status.is_usable()).count())
            .unwrap_or(0)
    }

    pub fn controls(&self) -> Vec<String> {
        let mut controls: Vec<String> = self.items.iter().map(|e| e.key().clone()).collect();
        controls.sort();
        controls
    }

    pub fn summary(&self) -> EvidenceSummary {
        let mut status_breakdown = BTreeMap::new();
        let mut total = 0;
        for entry in self.items.iter() {
            for item in entry.value() {
                total += 1;
                let key = serde_json::to_value(item.status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                *status_breakdown.entry(key).or_insert(0) += 1;
            }
        }

        EvidenceSummary {
            total_controls: self.items.len(),
            total_evidence_items: total,
            status_breakdown,
        }
    }
}
