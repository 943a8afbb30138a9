//! Baseline control data source.

use super::{ComplianceError, ComplianceResult};
use crate::constants::system::BASELINES;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Source of baseline control lists consumed by the gap analysis step
#[async_trait]
pub trait ControlCatalog: Send + Sync {
    /// Control ids required by a baseline (`low`, `moderate` or `high`)
    async fn baseline_controls(&self, baseline: &str) -> ComplianceResult<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    baselines: HashMap<String, Vec<String>>,
}

/// Catalog backed by an in-memory baseline table
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    baselines: HashMap<String, Vec<String>>,
}

impl StaticCatalog {
    pub fn new(baselines: HashMap<String, Vec<String>>) -> Self {
        let baselines = baselines
            .into_iter()
            .map(|(name, controls)| {
                let controls = controls.into_iter().map(|c| c.to_uppercase()).collect();
                (name.to_lowercase(), controls)
            })
            .collect();
        Self { baselines }
    }

    /// Parse `{"baselines": {"low": ["AC-1", ...], ...}}`
    pub fn from_json_str(json: &str) -> ComplianceResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| ComplianceError::Catalog(format!("invalid catalog JSON: {e}")))?;
        Ok(Self::new(file.baselines))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ComplianceResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ComplianceError::Catalog(format!("failed to read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loading static control catalog");
        Self::from_json_str(&contents)
    }

    pub fn with_baseline(
        mut self,
        baseline: &str,
        controls: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.baselines.insert(
            baseline.to_lowercase(),
            controls.into_iter().map(|c| c.into().to_uppercase()).collect(),
        );
        self
    }
}

#[async_trait]
impl ControlCatalog for StaticCatalog {
    async fn baseline_controls(&self, baseline: &str) -> ComplianceResult<Vec<String>> {
        let normalized = baseline.to_lowercase();
        if !BASELINES.contains(&normalized.as_str()) {
            return Err(ComplianceError::UnknownBaseline(baseline.to_string()));
        }

        self.baselines.get(&normalized).cloned().ok_or_else(|| {
            ComplianceError::Catalog(format!("baseline '{normalized}' is not loaded"))
        })
    }
}
