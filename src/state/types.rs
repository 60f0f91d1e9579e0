//! Session state types
//!
//! Field names follow the JSON the presentation layer renders, so the
//! whole snapshot serializes straight onto the wire.

use crate::agent::{AgentKind, LifecycleState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which side of the conversation a transcript belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "self")]
    Own,
    #[serde(rename = "other")]
    Other,
}

/// Lifecycle of a suggestion as it streams in from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionState {
    Idle,
    Pending,
    Loading,
    Success,
    Stopped,
    Error,
}

/// Coarse assistant run state shown in the status panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// One finalized transcript fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Milliseconds since the UNIX epoch
    pub timestamp: i64,
    pub text: String,
    pub speaker: Speaker,
    pub is_final: bool,
}

/// A generated reply suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySuggestion {
    pub timestamp: i64,
    pub content: String,
    pub state: SuggestionState,
}

/// A generated code suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSuggestion {
    pub timestamp: i64,
    pub content: String,
    pub state: SuggestionState,
}

/// Per-agent supervision status surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub state: LifecycleState,
    pub restart_count: u32,
    /// Milliseconds since the UNIX epoch of the last sign of life
    pub last_alive: Option<i64>,
}

impl AgentStatus {
    pub fn idle() -> Self {
        Self {
            state: LifecycleState::Idle,
            restart_count: 0,
            last_alive: None,
        }
    }
}

/// Full session state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub is_running: bool,
    pub is_stealth: bool,
    pub is_recording: bool,
    pub is_backend_live: bool,
    pub is_gpu_server_live: bool,
    pub is_logged_in: bool,
    pub running_state: RunningState,
    pub credits: Option<u64>,
    pub agents: HashMap<AgentKind, AgentStatus>,
    pub transcripts: Vec<Transcript>,
    pub reply_suggestions: Vec<ReplySuggestion>,
    pub code_suggestions: Vec<CodeSuggestion>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            is_running: false,
            is_stealth: false,
            is_recording: false,
            is_backend_live: false,
            is_gpu_server_live: false,
            is_logged_in: false,
            running_state: RunningState::Idle,
            credits: None,
            agents: HashMap::new(),
            transcripts: Vec::new(),
            reply_suggestions: Vec::new(),
            code_suggestions: Vec::new(),
        }
    }
}

/// Shallow patch over the top-level snapshot fields.
///
/// `agents` is merged per key rather than replaced, so a supervisor
/// reporting one agent never clobbers another agent's entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatePatch {
    pub is_running: Option<bool>,
    pub is_stealth: Option<bool>,
    pub is_recording: Option<bool>,
    pub is_backend_live: Option<bool>,
    pub is_gpu_server_live: Option<bool>,
    pub is_logged_in: Option<bool>,
    pub running_state: Option<RunningState>,
    pub credits: Option<u64>,
    pub agents: Option<HashMap<AgentKind, AgentStatus>>,
}

impl StatePatch {
    /// Apply the patch to a snapshot, field by field.
    pub fn apply(&self, state: &mut RuntimeState) {
        if let Some(v) = self.is_running {
            state.is_running = v;
        }
        if let Some(v) = self.is_stealth {
            state.is_stealth = v;
        }
        if let Some(v) = self.is_recording {
            state.is_recording = v;
        }
        if let Some(v) = self.is_backend_live {
            state.is_backend_live = v;
        }
        if let Some(v) = self.is_gpu_server_live {
            state.is_gpu_server_live = v;
        }
        if let Some(v) = self.is_logged_in {
            state.is_logged_in = v;
        }
        if let Some(v) = self.running_state {
            state.running_state = v;
        }
        if let Some(v) = self.credits {
            state.credits = Some(v);
        }
        if let Some(ref agents) = self.agents {
            for (kind, status) in agents {
                state.agents.insert(*kind, *status);
            }
        }
    }

    /// Patch containing a single agent status entry.
    pub fn agent(kind: AgentKind, status: AgentStatus) -> Self {
        let mut agents = HashMap::new();
        agents.insert(kind, status);
        Self {
            agents: Some(agents),
            ..Self::default()
        }
    }
}
