//! Liveness prober
//!
//! Periodically checks the backend and the GPU compute server and
//! degrades the corresponding state flags on failure. A failed probe
//! never throws and never stops the interval; the fixed cadence is the
//! only retry throttle.

use crate::backend::{ClientPingRequest, HealthApi};
use crate::state::{StatePatch, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Fixed-interval health monitor for the remote collaborators.
pub struct LivenessProber {
    api: Arc<dyn HealthApi>,
    store: Arc<StateStore>,
    interval: Duration,
}

impl LivenessProber {
    pub fn new(api: Arc<dyn HealthApi>, store: Arc<StateStore>, interval_ms: u64) -> Self {
        Self {
            api,
            store,
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Run the probe loop until the task is aborted.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_ms = self.interval.as_millis() as u64, "Liveness prober started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// One probe round: backend, GPU server (when logged in), client
    /// ping. Each result lands in the store as a flag; failures are
    /// reflected, never propagated.
    pub async fn tick(&self) {
        let backend_live = self.api.ping().await.is_ok();
        if !backend_live {
            tracing::debug!("Backend not live");
        }
        self.store
            .update(StatePatch {
                is_backend_live: Some(backend_live),
                ..StatePatch::default()
            })
            .await;

        let state = self.store.get().await;

        // The GPU server only matters for an authenticated session; the
        // wakeup request is fire-and-forget.
        let mut gpu_live = state.is_gpu_server_live;
        if state.is_logged_in {
            gpu_live = self.api.ping_gpu_server().await.is_ok();
            if !gpu_live {
                tracing::debug!("GPU server not live, attempting wakeup");
                self.api.wakeup_gpu_server().await;
            }
            self.store
                .update(StatePatch {
                    is_gpu_server_live: Some(gpu_live),
                    ..StatePatch::default()
                })
                .await;
        }

        // The client ping both reports our status and tells us whether
        // the session is still valid (and how many credits remain).
        let response = self
            .api
            .ping_client(ClientPingRequest {
                is_gpu_alive: gpu_live,
                is_assistant_running: state.is_running,
            })
            .await;

        let mut patch = StatePatch {
            is_logged_in: Some(response.is_ok()),
            ..StatePatch::default()
        };
        if let Some(data) = response.data {
            patch.credits = Some(data.credits);
        }
        self.store.update(patch).await;
    }
}
