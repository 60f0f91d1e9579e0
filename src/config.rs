//! Prompter configuration management

use crate::agent::{AgentDescriptor, AgentKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main Prompter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrompterConfig {
    /// Local control server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Liveness probe configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Agent configurations
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Local control server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18520,
            cors_origins: Vec::new(),
        }
    }
}

/// Remote backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend base URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Session token for authenticated endpoints
    pub session_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
            session_token: None,
        }
    }
}

impl BackendConfig {
    /// Derive the streaming recognition WebSocket URL from the base URL.
    pub fn asr_streaming_url(&self) -> String {
        format!(
            "{}/api/asr/streaming",
            self.base_url.replacen("http", "ws", 1)
        )
    }
}

/// Liveness probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe interval in milliseconds
    pub interval_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Restart policy shared by all agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Maximum automatic restarts before the agent is marked failed
    pub max_restart_count: u32,

    /// Delay before a restart attempt, in milliseconds
    pub restart_delay_ms: u64,

    /// Longest tolerated silence on the data channel, in milliseconds
    pub inter_message_gap_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restart_count: 5,
            restart_delay_ms: 2000,
            inter_message_gap_ms: 5000,
        }
    }
}

/// Agent configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Directory holding the agent executables
    pub agents_dir: Option<PathBuf>,

    /// Restart policy applied to every agent
    #[serde(default)]
    pub policy: RestartPolicy,

    /// Speech recognition for the user's own audio
    #[serde(default)]
    pub asr_self: AsrAgentConfig,

    /// Speech recognition for the other party (loopback capture)
    #[serde(default = "default_asr_other")]
    pub asr_other: AsrAgentConfig,

    /// Virtual camera bridge
    #[serde(default)]
    pub vcam: VcamAgentConfig,

    /// Audio delay control
    #[serde(default)]
    pub audio_control: AudioControlConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agents_dir: None,
            policy: RestartPolicy::default(),
            asr_self: AsrAgentConfig::default(),
            asr_other: default_asr_other(),
            vcam: VcamAgentConfig::default(),
            audio_control: AudioControlConfig::default(),
        }
    }
}

fn default_asr_other() -> AsrAgentConfig {
    AsrAgentConfig {
        port: 50003,
        audio_source: "loopback".to_string(),
    }
}

/// Speech recognition agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrAgentConfig {
    /// Message channel port
    pub port: u16,

    /// Audio capture source device name
    pub audio_source: String,
}

impl Default for AsrAgentConfig {
    fn default() -> Self {
        Self {
            port: 50002,
            audio_source: "loopback".to_string(),
        }
    }
}

/// Virtual camera agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcamAgentConfig {
    /// Message channel port
    pub port: u16,

    /// Frame width
    pub width: u32,

    /// Frame height
    pub height: u32,

    /// Frames per second
    pub fps: u32,
}

impl Default for VcamAgentConfig {
    fn default() -> Self {
        Self {
            port: 50001,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Audio delay control agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioControlConfig {
    /// Input device name (partial match supported by the agent)
    pub input_device: Option<String>,

    /// Audio delay in milliseconds
    pub delay_ms: u64,
}

impl Default for AudioControlConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            delay_ms: 300,
        }
    }
}

impl PrompterConfig {
    /// Build the descriptor for one agent kind.
    ///
    /// Descriptors are immutable; the supervisor keeps the copy it was
    /// started with for the lifetime of the instance.
    pub fn descriptor(&self, kind: AgentKind) -> AgentDescriptor {
        let policy = self.agents.policy.clone();
        match kind {
            AgentKind::AsrSelf => AgentDescriptor {
                kind,
                port: Some(self.agents.asr_self.port),
                policy,
                args: asr_args(
                    self.agents.asr_self.port,
                    &self.agents.asr_self.audio_source,
                    &self.backend.asr_streaming_url(),
                ),
            },
            AgentKind::AsrOther => AgentDescriptor {
                kind,
                port: Some(self.agents.asr_other.port),
                policy,
                args: asr_args(
                    self.agents.asr_other.port,
                    &self.agents.asr_other.audio_source,
                    &self.backend.asr_streaming_url(),
                ),
            },
            AgentKind::Vcam => {
                let v = &self.agents.vcam;
                AgentDescriptor {
                    kind,
                    port: Some(v.port),
                    policy,
                    args: vec![
                        "--port".to_string(),
                        v.port.to_string(),
                        "--width".to_string(),
                        v.width.to_string(),
                        "--height".to_string(),
                        v.height.to_string(),
                        "--fps".to_string(),
                        v.fps.to_string(),
                        "--watch-parent".to_string(),
                    ],
                }
            }
            AgentKind::AudioControl => {
                let a = &self.agents.audio_control;
                let mut args = Vec::new();
                if let Some(ref device) = a.input_device {
                    args.push("--input".to_string());
                    args.push(device.clone());
                }
                args.push("--delay".to_string());
                args.push(a.delay_ms.to_string());
                args.push("--watch-parent".to_string());
                AgentDescriptor {
                    kind,
                    port: None,
                    policy,
                    args,
                }
            }
        }
    }

    /// Reject configurations that would double-bind a channel port.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut seen: std::collections::HashMap<u16, AgentKind> = std::collections::HashMap::new();
        for kind in AgentKind::ALL {
            if let Some(port) = self.descriptor(kind).port {
                if let Some(previous) = seen.insert(port, kind) {
                    return Err(crate::error::Error::Config(format!(
                        "Agents {} and {} share channel port {}",
                        previous, kind, port
                    )));
                }
            }
        }
        Ok(())
    }
}

fn asr_args(port: u16, source: &str, url: &str) -> Vec<String> {
    vec![
        "--port".to_string(),
        port.to_string(),
        "--source".to_string(),
        source.to_string(),
        "--url".to_string(),
        url.to_string(),
        "--watch-parent".to_string(),
    ]
}
