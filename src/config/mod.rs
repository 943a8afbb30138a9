//! # Strands Configuration System
//!
//! Layered configuration for the workflow core: compiled-in defaults, an optional
//! `strands.toml`, an optional per-environment `strands.{env}.toml`, then
//! `STRANDS__SECTION__KEY` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strands_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let timeout = manager.config().execution.default_step_timeout();
//! let backend = &manager.config().run_store.backend;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants::system;
use crate::error::{Result, StrandsError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrandsConfig {
    pub execution: ExecutionConfig,
    pub backoff: BackoffConfig,
    pub run_store: RunStoreConfig,
}

impl StrandsConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.execution.default_step_timeout_seconds == 0 {
            return Err(StrandsError::Configuration(
                "execution.default_step_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.execution.idle_wait_ms == 0 {
            return Err(StrandsError::Configuration(
                "execution.idle_wait_ms must be greater than zero".to_string(),
            ));
        }
        if self.execution.max_workflow_steps == 0 {
            return Err(StrandsError::Configuration(
                "execution.max_workflow_steps must be greater than zero".to_string(),
            ));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(StrandsError::Configuration(format!(
                "backoff.multiplier must be at least 1.0, got {}",
                self.backoff.multiplier
            )));
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(StrandsError::Configuration(format!(
                "backoff.max_delay_ms ({}) is lower than backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms, self.backoff.base_delay_ms
            )));
        }
        if self.run_store.backend == RunStoreBackend::Sqlite
            && self.run_store.database_url.trim().is_empty()
        {
            return Err(StrandsError::Configuration(
                "run_store.database_url is required for the sqlite backend".to_string(),
            ));
        }
        if self.run_store.max_connections == 0 {
            return Err(StrandsError::Configuration(
                "run_store.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Strand execution configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout applied to steps built without an explicit one
    pub default_step_timeout_seconds: u64,
    /// Upper bound for a single idle wait of the strand driver
    pub idle_wait_ms: u64,
    pub max_workflow_steps: usize,
}

impl ExecutionConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_seconds)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_seconds: system::DEFAULT_STEP_TIMEOUT_SECONDS,
            idle_wait_ms: 1000,
            max_workflow_steps: system::MAX_WORKFLOW_STEPS,
        }
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Run store configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunStoreConfig {
    pub backend: RunStoreBackend,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for RunStoreConfig {
    fn default() -> Self {
        Self {
            backend: RunStoreBackend::Memory,
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}
