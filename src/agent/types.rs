//! Agent descriptors, lifecycle states, and the channel envelope
//!
//! The envelope is newline-delimited JSON: each line is one
//! `{"kind": ..., "seq": ..., "payload": ...}` object. The payload is
//! opaque to the supervisor except for the transcript kind.

use crate::config::RestartPolicy;
use crate::state::Speaker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of agents the runtime can supervise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Speech recognition for the user's own audio
    AsrSelf,
    /// Speech recognition for the other party
    AsrOther,
    /// Virtual camera bridge
    Vcam,
    /// Audio delay control (no data channel)
    AudioControl,
}

impl AgentKind {
    /// Every supervisable kind, in manager construction order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::AsrSelf,
        AgentKind::AsrOther,
        AgentKind::Vcam,
        AgentKind::AudioControl,
    ];

    /// Executable name of the agent binary (platform suffix excluded).
    pub fn binary_name(&self) -> &'static str {
        match self {
            AgentKind::AsrSelf | AgentKind::AsrOther => "asr_agent",
            AgentKind::Vcam => "vcam_agent",
            AgentKind::AudioControl => "audio_control_agent",
        }
    }

    /// Which conversation side this agent transcribes, if any.
    pub fn speaker(&self) -> Option<Speaker> {
        match self {
            AgentKind::AsrSelf => Some(Speaker::Own),
            AgentKind::AsrOther => Some(Speaker::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::AsrSelf => "asr_self",
            AgentKind::AsrOther => "asr_other",
            AgentKind::Vcam => "vcam",
            AgentKind::AudioControl => "audio_control",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable launch configuration for one agent kind
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub kind: AgentKind,

    /// Message channel port; `None` for agents without a data channel
    pub port: Option<u16>,

    /// Crash-restart policy
    pub policy: RestartPolicy,

    /// Command-line arguments passed to the agent binary
    pub args: Vec<String>,
}

/// Supervisor lifecycle state as surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
    Restarting,
    /// Restart budget exhausted; only an explicit start clears this
    Failed,
}

/// Message kinds the supervisor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Heartbeat,
    Transcript,
    Status,
    Error,
}

/// One framed message on an agent channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: MessageKind,

    /// Per-channel send sequence, monotonically increasing
    pub seq: u64,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: MessageKind, seq: u64, payload: serde_json::Value) -> Self {
        Self { kind, seq, payload }
    }

    pub fn heartbeat(seq: u64) -> Self {
        Self::new(MessageKind::Heartbeat, seq, serde_json::Value::Null)
    }
}

/// Payload of a `transcript` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub text: String,
    pub is_final: bool,
    /// Milliseconds since the UNIX epoch; supervisor receive time if absent
    pub timestamp: Option<i64>,
}
