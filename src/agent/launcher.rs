//! Agent process lifecycle primitives
//!
//! `ProcessLauncher` is the seam between the supervisor's state machine
//! and the operating system: production uses `CommandLauncher` on
//! `tokio::process`, tests substitute a scripted launcher.

use crate::agent::types::{AgentDescriptor, AgentKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Grace period between SIGTERM-equivalent and force kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// A spawned agent process under supervision.
#[async_trait]
pub trait AgentProcess: Send {
    /// OS process id, if the process is still attached.
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit; returns the exit code, or `None`
    /// if it was terminated by a signal. Cancel safe.
    async fn wait(&mut self) -> Option<i32>;

    /// Terminate the process: graceful first, forced after a grace
    /// period. Idempotent.
    async fn kill(&mut self);
}

/// Spawns agent processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, descriptor: &AgentDescriptor) -> Result<Box<dyn AgentProcess>>;
}

/// Production launcher backed by `tokio::process::Command`.
pub struct CommandLauncher {
    agents_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(agents_dir: Option<PathBuf>) -> Self {
        Self { agents_dir }
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn spawn(&self, descriptor: &AgentDescriptor) -> Result<Box<dyn AgentProcess>> {
        let binary = resolve_agent_binary(descriptor.kind, self.agents_dir.as_deref())?;

        tracing::info!(
            kind = %descriptor.kind,
            binary = %binary.display(),
            args = ?descriptor.args,
            "Spawning agent"
        );

        let mut child = Command::new(&binary)
            .args(&descriptor.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!(
                    "Failed to spawn {} at {}: {}",
                    descriptor.kind,
                    binary.display(),
                    e
                ))
            })?;

        forward_output(descriptor.kind, &mut child);

        Ok(Box::new(ChildProcess { child }))
    }
}

/// Forward the agent's stdout/stderr into our log stream.
fn forward_output(kind: AgentKind, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(agent = %kind, "{}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(agent = %kind, "{}", line);
            }
        });
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl AgentProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(_) => Some(-1),
        }
    }

    async fn kill(&mut self) {
        // Graceful shutdown first
        let _ = self.child.start_kill();

        if tokio::time::timeout(KILL_GRACE, self.child.wait())
            .await
            .is_err()
        {
            tracing::warn!(pid = ?self.child.id(), "Force killing agent process");
            let _ = self.child.kill().await;
        }
    }
}

/// Resolve the executable for an agent kind.
///
/// Checked in order: the configured agents directory, `agents/` under
/// the working directory, the per-user data directory.
pub fn resolve_agent_binary(kind: AgentKind, agents_dir: Option<&Path>) -> Result<PathBuf> {
    let exe_name = if cfg!(windows) {
        format!("{}.exe", kind.binary_name())
    } else {
        kind.binary_name().to_string()
    };

    let mut candidates = Vec::new();
    if let Some(dir) = agents_dir {
        candidates.push(dir.join(&exe_name));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("agents").join(&exe_name));
    }
    if let Some(data) = dirs_next::data_dir() {
        candidates.push(data.join("prompter").join("agents").join(&exe_name));
    }

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    Err(Error::Spawn(format!(
        "Agent binary '{}' not found (searched {} locations)",
        exe_name,
        candidates.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartPolicy;

    fn descriptor(kind: AgentKind) -> AgentDescriptor {
        AgentDescriptor {
            kind,
            port: None,
            policy: RestartPolicy::default(),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_missing_binary_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = resolve_agent_binary(AgentKind::Vcam, Some(dir.path()));
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[test]
    fn test_resolve_finds_configured_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(AgentKind::Vcam.binary_name());
        std::fs::write(&path, b"").unwrap();

        let resolved = resolve_agent_binary(AgentKind::Vcam, Some(dir.path())).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_asr_kinds_share_a_binary() {
        assert_eq!(
            AgentKind::AsrSelf.binary_name(),
            AgentKind::AsrOther.binary_name()
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = CommandLauncher::new(Some(dir.path().to_path_buf()));
        let result = launcher.spawn(&descriptor(AgentKind::AudioControl)).await;
        assert!(matches!(result, Err(Error::Spawn(_))));
    }
}
