//! Agent supervision
//!
//! Each agent is an external process (speech recognition, virtual
//! camera, audio delay control) owned by one [`Supervisor`]. The
//! supervisor spawns the process, consumes its message channel, detects
//! crashes (process exit or channel silence), restarts within a bounded
//! budget, and reports lifecycle status into the state store.

mod channel;
mod launcher;
mod manager;
mod supervisor;
mod types;

pub use channel::MessageChannel;
pub use launcher::{resolve_agent_binary, AgentProcess, CommandLauncher, ProcessLauncher};
pub use manager::AgentManager;
pub use supervisor::{Supervisor, SupervisorHandle};
pub use types::{AgentDescriptor, AgentKind, Envelope, LifecycleState, MessageKind, TranscriptPayload};
