//! Agent manager
//!
//! Owns exactly one supervisor per agent kind. Kinds map to fixed
//! channel ports, so one-supervisor-per-kind is also one-instance-per-
//! port: a port can never be double-bound.

use crate::agent::launcher::ProcessLauncher;
use crate::agent::supervisor::{Supervisor, SupervisorHandle};
use crate::agent::types::AgentKind;
use crate::config::PrompterConfig;
use crate::error::{Error, Result};
use crate::state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;

/// One supervisor per agent kind, constructed up front.
pub struct AgentManager {
    supervisors: HashMap<AgentKind, SupervisorHandle>,
}

impl AgentManager {
    /// Spawn a supervisor for every known agent kind.
    pub fn new(
        config: &PrompterConfig,
        launcher: Arc<dyn ProcessLauncher>,
        store: Arc<StateStore>,
    ) -> Self {
        let mut supervisors = HashMap::new();
        for kind in AgentKind::ALL {
            let descriptor = config.descriptor(kind);
            let handle = Supervisor::spawn(descriptor, launcher.clone(), store.clone());
            supervisors.insert(kind, handle);
        }
        Self { supervisors }
    }

    /// Request an agent to run.
    pub async fn start(&self, kind: AgentKind) -> Result<()> {
        self.handle(kind)?.start().await
    }

    /// Request an agent to stop.
    pub async fn stop(&self, kind: AgentKind) -> Result<()> {
        self.handle(kind)?.stop().await
    }

    /// Request every agent to stop; used at teardown.
    pub async fn stop_all(&self) {
        for (kind, handle) in &self.supervisors {
            if let Err(e) = handle.stop().await {
                tracing::warn!(kind = %kind, error = %e, "Failed to stop agent");
            }
        }
    }

    /// Supervised kinds, for diagnostics.
    pub fn kinds(&self) -> Vec<AgentKind> {
        self.supervisors.keys().copied().collect()
    }

    fn handle(&self, kind: AgentKind) -> Result<&SupervisorHandle> {
        self.supervisors
            .get(&kind)
            .ok_or_else(|| Error::Internal(format!("No supervisor for agent kind {}", kind)))
    }
}
