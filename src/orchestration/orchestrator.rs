//! # Strands Orchestrator
//!
//! Instantiates strands from registered templates, runs them and tracks the ones
//! currently in flight.
//!
//! A strand id is in the active set only while the strand is `Pending` or
//! `Running`. Removal happens in a drop guard, so it also happens when the
//! execution errors or its future is dropped before completion.
//!
//! ## Usage
//!
//! ```rust
//! use strands_core::orchestration::{StrandsOrchestrator, TemplateArgs};
//! use strands_core::orchestration::step::{action_fn, Step};
//! use strands_core::run_store::InMemoryRunStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let orchestrator = StrandsOrchestrator::new(Arc::new(InMemoryRunStore::new()));
//! orchestrator.register_template("hello", "Hello", "One step", |_controls, _args| {
//!     vec![Step::new("greet", "demo", "say hello", action_fn(|_, _| async { Ok(json!("hi")) }))]
//! });
//!
//! let mut strand = orchestrator
//!     .create_strand("hello", vec!["AC-1".to_string()], TemplateArgs::new())
//!     .unwrap();
//! assert_eq!(orchestrator.list_active().len(), 1);
//!
//! let result = orchestrator.execute_async(&mut strand).await.unwrap();
//! assert_eq!(result.context["results"]["greet"], json!("hi"));
//! assert!(orchestrator.list_active().is_empty());
//! # });
//! ```

use crate::config::StrandsConfig;
use crate::error::{Result, StrandsError};
use crate::logging::log_strand_operation;
use crate::orchestration::context::Collaborators;
use crate::orchestration::registry::TemplateRegistry;
use crate::orchestration::step::Step;
use crate::orchestration::strand::{Strand, StrandProgress};
use crate::orchestration::types::{StrandResult, StrandStatusSnapshot, TemplateArgs, TemplateInfo};
use crate::run_store::{RunRecord, RunStore};
use chrono::Utc;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Removes a strand from the active set when dropped
struct ActiveStrandGuard<'a> {
    active: &'a DashMap<String, Arc<StrandProgress>>,
    strand_id: String,
}

impl Drop for ActiveStrandGuard<'_> {
    fn drop(&mut self) {
        if self.active.remove(&self.strand_id).is_some() {
            debug!(strand_id = %self.strand_id, "Removed strand from active set");
        }
    }
}

pub struct StrandsOrchestrator {
    registry: TemplateRegistry,
    active: DashMap<String, Arc<StrandProgress>>,
    run_store: Arc<dyn RunStore>,
    collaborators: Collaborators,
    config: StrandsConfig,
}

impl fmt::Debug for StrandsOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrandsOrchestrator")
            .field("templates", &self.registry.len())
            .field("active", &self.active.len())
            .field("run_store", &self.run_store)
            .field("collaborators", &self.collaborators)
            .finish()
    }
}

impl StrandsOrchestrator {
    pub fn new(run_store: Arc<dyn RunStore>) -> Self {
        Self::with_config(run_store, Collaborators::default(), StrandsConfig::default())
    }

    pub fn with_config(
        run_store: Arc<dyn RunStore>,
        collaborators: Collaborators,
        config: StrandsConfig,
    ) -> Self {
        Self {
            registry: TemplateRegistry::new(),
            active: DashMap::new(),
            run_store,
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &StrandsConfig {
        &self.config
    }

    pub fn run_store(&self) -> &Arc<dyn RunStore> {
        &self.run_store
    }

    /// Register a reusable template; a second registration under the same name replaces the first
    pub fn register_template<F>(&self, name: &str, display_name: &str, description: &str, builder: F)
    where
        F: Fn(&[String], &TemplateArgs) -> Vec<Step> + Send + Sync + 'static,
    {
        self.registry.register(name, display_name, description, builder);
    }

    /// Register the built-in `compliance_assessment` and `family_assessment` templates
    pub fn register_default_templates(&self) {
        crate::steps::templates::register_default_templates(self);
    }

    pub fn list_templates(&self) -> Vec<TemplateInfo> {
        self.registry.list()
    }

    /// Build a strand from a template and add it to the active set without starting it
    #[instrument(skip(self, args), fields(template = template_name))]
    pub fn create_strand(
        &self,
        template_name: &str,
        target_controls: Vec<String>,
        args: TemplateArgs,
    ) -> Result<Strand> {
        let template = self
            .registry
            .get(template_name)
            .ok_or_else(|| StrandsError::UnknownTemplate(template_name.to_string()))?;

        let strand_id = generate_strand_id(template_name);
        let steps = template.build_steps(&target_controls, &args);

        let strand = Strand::new(
            strand_id.clone(),
            template.info.display_name.clone(),
            template.info.description.clone(),
            target_controls,
            steps,
            self.collaborators.clone(),
            self.run_store.clone(),
            &self.config,
        )?
        .with_template(template_name);

        self.active.insert(strand_id.clone(), strand.progress());
        log_strand_operation("create", &strand_id, Some(template_name), "pending", None);
        info!(
            strand_id = %strand_id,
            steps = strand.steps().len(),
            "Created strand"
        );
        Ok(strand)
    }

    /// Execute a strand, removing it from the active set however execution ends
    pub async fn execute_async(&self, strand: &mut Strand) -> Result<StrandResult> {
        let _guard = ActiveStrandGuard {
            active: &self.active,
            strand_id: strand.id().to_string(),
        };
        strand.execute().await
    }

    /// Status of an active strand, `None` once it has finished
    pub fn get_status(&self, strand_id: &str) -> Option<StrandStatusSnapshot> {
        self.active.get(strand_id).map(|progress| progress.snapshot())
    }

    /// Snapshots of every active strand, ordered by id
    pub fn list_active(&self) -> Vec<StrandStatusSnapshot> {
        let mut snapshots: Vec<StrandStatusSnapshot> =
            self.active.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.strand_id.cmp(&b.strand_id));
        snapshots
    }

    /// Request cancellation of an active strand; `false` if it is not active
    pub fn cancel(&self, strand_id: &str) -> bool {
        match self.active.get(strand_id) {
            Some(progress) => {
                progress.cancel();
                info!(strand_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Run history for a strand id, most recent first
    pub async fn run_history(&self, workflow_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        self.run_store.read_runs(workflow_id, limit).await
    }
}

/// `strand_<template>_<YYYYmmdd_HHMMSS>_<8 hex chars>`
pub fn generate_strand_id(template_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "strand_{template_name}_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}
