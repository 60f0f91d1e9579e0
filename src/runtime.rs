//! The runtime context
//!
//! One `Runtime` owns every core component (state store, action lock,
//! agent manager, backend client, liveness prober) with an explicit
//! start/stop lifecycle. Collaborators receive references; nothing is a
//! process-global.

use crate::action::ActionLock;
use crate::agent::{AgentManager, CommandLauncher, ProcessLauncher};
use crate::backend::{BackendClient, HealthApi};
use crate::config::PrompterConfig;
use crate::error::Result;
use crate::probe::LivenessProber;
use crate::state::StateStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Top-level application context for the runtime core.
pub struct Runtime {
    config: PrompterConfig,
    store: Arc<StateStore>,
    action_lock: ActionLock,
    agents: AgentManager,
    health_api: Arc<dyn HealthApi>,
    prober: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Start background work (currently the liveness prober).
    pub async fn start(&self) {
        let mut prober = self.prober.lock().await;
        if prober.is_some() {
            tracing::debug!("Runtime already started");
            return;
        }
        let handle = LivenessProber::new(
            self.health_api.clone(),
            self.store.clone(),
            self.config.probe.interval_ms,
        )
        .spawn();
        *prober = Some(handle);
        tracing::info!("Runtime started");
    }

    /// Stop background work and all agents.
    pub async fn stop(&self) {
        if let Some(handle) = self.prober.lock().await.take() {
            handle.abort();
        }
        self.agents.stop_all().await;
        tracing::info!("Runtime stopped");
    }

    pub fn config(&self) -> &PrompterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn action_lock(&self) -> &ActionLock {
        &self.action_lock
    }

    pub fn agents(&self) -> &AgentManager {
        &self.agents
    }
}

/// Builds a [`Runtime`], with seams for substituting the launcher and
/// the backend client in tests.
pub struct RuntimeBuilder {
    config: PrompterConfig,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    health_api: Option<Arc<dyn HealthApi>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: PrompterConfig::default(),
            launcher: None,
            health_api: None,
        }
    }

    pub fn config(mut self, config: PrompterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn health_api(mut self, health_api: Arc<dyn HealthApi>) -> Self {
        self.health_api = Some(health_api);
        self
    }

    pub fn build(self) -> Result<Arc<Runtime>> {
        self.config.validate()?;

        let store = Arc::new(StateStore::new());
        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(CommandLauncher::new(self.config.agents.agents_dir.clone()))
        });
        let health_api: Arc<dyn HealthApi> = match self.health_api {
            Some(api) => api,
            None => Arc::new(BackendClient::new(&self.config.backend)?),
        };
        let agents = AgentManager::new(&self.config, launcher, store.clone());

        Ok(Arc::new(Runtime {
            config: self.config,
            store,
            action_lock: ActionLock::new(),
            agents,
            health_api,
            prober: Mutex::new(None),
        }))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
