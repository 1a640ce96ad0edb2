//! Orchestrator wiring shared by every command.

use anyhow::Context;
use relay_abstraction::ProviderAdapter;
use relay_orchestrator::{
    ConfigLoader, EchoProvider, JobBus, NodeRegistry, OrchestratorConfig, ProviderRegistry,
    RequestRouter, TaskScheduler, WorkflowEngine,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Router, engine and scheduler built from one configuration.
pub struct Runtime {
    config: OrchestratorConfig,
    router: Arc<RequestRouter>,
    jobs: Arc<JobBus>,
}

impl Runtime {
    /// Builds the runtime from an optional configuration file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => ConfigLoader::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => OrchestratorConfig::default(),
        };

        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(EchoProvider::new()) as Arc<dyn ProviderAdapter>);
        debug!(providers = ?registry.tags(), "Provider registry ready");

        let jobs = Arc::new(JobBus::new());
        let router = RequestRouter::from_config(&config, Arc::new(registry), Arc::clone(&jobs))?;

        Ok(Self { config, router: Arc::new(router), jobs })
    }

    /// A workflow engine with every built-in node handler.
    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(
            Arc::new(NodeRegistry::with_builtins(Arc::clone(&self.router))),
            Arc::clone(&self.jobs),
        )
    }

    /// A scheduler honouring the configured dependency policy.
    pub fn scheduler(&self) -> TaskScheduler {
        TaskScheduler::from_settings(Arc::clone(&self.router), &self.config.scheduler)
    }

    /// The request router.
    pub fn router(&self) -> &RequestRouter {
        &self.router
    }
}
