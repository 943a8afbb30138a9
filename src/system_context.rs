use crate::compliance::{ControlCatalog, ControlMonitor, EvidenceStore};
use crate::config::ConfigManager;
use crate::error::Result;
use crate::orchestration::context::Collaborators;
use crate::orchestration::orchestrator::StrandsOrchestrator;
use crate::run_store::{self, RunStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared process-level dependencies
///
/// Built once at startup and passed explicitly to whatever needs it:
/// - Configuration manager
/// - Run store selected by `run_store.backend`
/// - Control monitor and evidence store
/// - Optional control catalog (gap analysis steps fail without one)
/// - Orchestrator with the default templates registered
pub struct SystemContext {
    /// System instance ID
    pub system_id: Uuid,

    pub config_manager: Arc<ConfigManager>,

    pub run_store: Arc<dyn RunStore>,

    pub monitor: Arc<ControlMonitor>,

    pub evidence: Arc<EvidenceStore>,

    pub catalog: Option<Arc<dyn ControlCatalog>>,

    pub orchestrator: Arc<StrandsOrchestrator>,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system_id", &self.system_id)
            .field("environment", &self.config_manager.environment())
            .field("run_store", &self.run_store)
            .field("monitor", &self.monitor)
            .field(
                "catalog",
                &self
                    .catalog
                    .as_ref()
                    .map(|_| "Some(Arc<dyn ControlCatalog>)")
                    .unwrap_or("None"),
            )
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl SystemContext {
    /// Load configuration for the detected environment and build every component
    pub async fn new() -> Result<Self> {
        let config_manager = ConfigManager::load()?;
        Self::from_config(config_manager).await
    }

    /// Build from an already loaded configuration, without a control catalog
    pub async fn from_config(config_manager: Arc<ConfigManager>) -> Result<Self> {
        Self::from_config_with_catalog(config_manager, None).await
    }

    pub async fn from_config_with_catalog(
        config_manager: Arc<ConfigManager>,
        catalog: Option<Arc<dyn ControlCatalog>>,
    ) -> Result<Self> {
        let config = config_manager.config();
        info!(
            environment = config_manager.environment(),
            backend = ?config.run_store.backend,
            "Initializing SystemContext"
        );

        let run_store = run_store::from_config(&config.run_store).await?;
        let monitor = Arc::new(ControlMonitor::new());
        let evidence = Arc::new(EvidenceStore::new());

        let mut collaborators = Collaborators::default()
            .with_monitor(monitor.clone())
            .with_evidence(evidence.clone());
        if let Some(catalog) = &catalog {
            collaborators = collaborators.with_catalog(catalog.clone());
        }

        let orchestrator = Arc::new(StrandsOrchestrator::with_config(
            run_store.clone(),
            collaborators,
            config.clone(),
        ));
        orchestrator.register_default_templates();

        let system_id = Uuid::new_v4();
        info!(system_id = %system_id, "SystemContext ready");

        Ok(Self {
            system_id,
            config_manager,
            run_store,
            monitor,
            evidence,
            catalog,
            orchestrator,
        })
    }
}
