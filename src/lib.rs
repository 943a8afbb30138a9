#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Strands Core Rust
//!
//! Workflow orchestration core for compliance assessments.
//!
//! ## Overview
//!
//! A **strand** is one workflow instance: a directed acyclic graph of **steps**
//! that share a mutable context. The engine runs every step whose dependencies
//! have completed as one concurrent wave, retries failed steps within their
//! budget, and stops with an explicit stuck error when no further progress is
//! possible instead of looping forever.
//!
//! ## Key Features
//!
//! - **Wave scheduling**: ready steps run concurrently on tokio, bounded by per-step timeouts
//! - **Retry with backoff**: failed steps are retried after an exponential delay
//! - **Explicit failure**: cycles, dangling dependencies, exhausted retries and
//!   skip-blocked dependents all end in [`StrandsError::StuckWorkflow`]
//! - **Cancellation**: an active strand can be cancelled from the orchestrator
//! - **Run history**: every start and terminal outcome is written to a [`run_store::RunStore`]
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Steps, strands, templates and the orchestrator
//! - [`state_machine`] - Step and strand state transitions
//! - [`run_store`] - Workflow run persistence (in-memory, SQLite)
//! - [`compliance`] - Catalog, gap analysis, monitoring and evidence collaborators
//! - [`steps`] - Built-in compliance step actions and default templates
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`system_context`] - Process-level dependency container
//!
//! ## Quick Start
//!
//! ```rust
//! use strands_core::compliance::StaticCatalog;
//! use strands_core::config::ConfigManager;
//! use strands_core::orchestration::TemplateArgs;
//! use strands_core::{StrandsConfig, SystemContext};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let manager = ConfigManager::from_config(StrandsConfig::default()).unwrap();
//! let catalog = Arc::new(StaticCatalog::default().with_baseline("moderate", ["AC-1", "AC-2"]));
//! let system = SystemContext::from_config_with_catalog(manager, Some(catalog))
//!     .await
//!     .unwrap();
//!
//! let mut strand = system
//!     .orchestrator
//!     .create_strand("compliance_assessment", vec!["AC-1".into(), "AC-2".into()], TemplateArgs::new())
//!     .unwrap();
//! let result = system.orchestrator.execute_async(&mut strand).await.unwrap();
//!
//! assert!(result.context.contains_key("remediation_plan"));
//! # });
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod compliance;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestration;
pub mod run_store;
pub mod state_machine;
pub mod steps;
pub mod system_context;

pub use config::{BackoffConfig, ExecutionConfig, RunStoreBackend, RunStoreConfig, StrandsConfig};
pub use error::{Result, StrandsError, StuckReason};
pub use orchestration::{
    action_fn, BackoffPolicy, CancellationHandle, Collaborators, ContextMap, Step, StepAction,
    StepContext, StepError, StepOutcome, Strand, StrandResult, StrandStatusSnapshot,
    StrandsOrchestrator, TemplateArgs, TemplateInfo,
};
pub use run_store::{InMemoryRunStore, RunRecord, RunStatus, RunStore, RunUpdate, SqliteRunStore};
pub use state_machine::{StepState, StrandState};
pub use system_context::SystemContext;
