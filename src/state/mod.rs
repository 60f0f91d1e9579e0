//! Runtime session state
//!
//! A single authoritative in-memory snapshot of session status, written
//! by supervisors, the liveness prober, and command handlers; read (and
//! subscribed to) by the presentation layer.

mod store;
mod types;

pub use store::StateStore;
pub use types::{
    AgentStatus, CodeSuggestion, ReplySuggestion, RunningState, RuntimeState, Speaker, StatePatch,
    SuggestionState, Transcript,
};
