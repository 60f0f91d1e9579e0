//! Command boundary
//!
//! Every operation the presentation layer can invoke, consolidated into
//! one dispatch table keyed by command name. The transport (HTTP today)
//! only shuttles JSON in and out; the dispatch itself is transport-free
//! and testable on its own.

use crate::action::Acquire;
use crate::agent::AgentKind;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::state::{CodeSuggestion, ReplySuggestion, RuntimeState, StatePatch, Transcript};
use serde::{Deserialize, Serialize};

/// A command from the presentation layer, tagged by its wire name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    GetState,
    UpdateState {
        patch: StatePatch,
    },
    AddTranscript {
        entry: Transcript,
    },
    AddReplySuggestion {
        entry: ReplySuggestion,
    },
    AddCodeSuggestion {
        entry: CodeSuggestion,
    },
    ClearTranscripts,
    ClearSuggestions,
    StartAgent {
        kind: AgentKind,
    },
    StopAgent {
        kind: AgentKind,
    },
    #[serde(rename = "action-lock:try-acquire")]
    TryAcquireAction {
        #[serde(rename = "actionId")]
        action_id: String,
    },
    #[serde(rename = "action-lock:release")]
    ReleaseAction {
        #[serde(rename = "actionId")]
        action_id: String,
    },
}

/// Reply to a dispatched command.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    State(Box<RuntimeState>),
    Lock {
        acquired: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        holder: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Ack {
        ok: bool,
    },
}

impl CommandReply {
    fn ack() -> Self {
        CommandReply::Ack { ok: true }
    }
}

/// Execute one command against the runtime.
pub async fn dispatch(runtime: &Runtime, command: Command) -> Result<CommandReply> {
    match command {
        Command::GetState => Ok(CommandReply::State(Box::new(runtime.store().get().await))),

        Command::UpdateState { patch } => Ok(CommandReply::State(Box::new(
            runtime.store().update(patch).await,
        ))),

        Command::AddTranscript { entry } => {
            runtime.store().add_transcript(entry).await;
            Ok(CommandReply::ack())
        }

        Command::AddReplySuggestion { entry } => {
            runtime.store().add_reply_suggestion(entry).await;
            Ok(CommandReply::ack())
        }

        Command::AddCodeSuggestion { entry } => {
            runtime.store().add_code_suggestion(entry).await;
            Ok(CommandReply::ack())
        }

        Command::ClearTranscripts => {
            runtime.store().clear_transcripts().await;
            Ok(CommandReply::ack())
        }

        Command::ClearSuggestions => {
            runtime.store().clear_suggestions().await;
            Ok(CommandReply::ack())
        }

        Command::StartAgent { kind } => {
            runtime.agents().start(kind).await?;
            Ok(CommandReply::ack())
        }

        Command::StopAgent { kind } => {
            runtime.agents().stop(kind).await?;
            Ok(CommandReply::ack())
        }

        Command::TryAcquireAction { action_id } => {
            match runtime.action_lock().try_acquire(&action_id).await {
                Acquire::Acquired => Ok(CommandReply::Lock {
                    acquired: true,
                    holder: Some(action_id),
                    message: None,
                }),
                Acquire::Busy { holder } => Ok(CommandReply::Lock {
                    acquired: false,
                    message: Some(format!(
                        "{} is in progress. Try again a bit later.",
                        holder
                    )),
                    holder: Some(holder),
                }),
            }
        }

        Command::ReleaseAction { action_id } => {
            runtime.action_lock().release(&action_id).await;
            Ok(CommandReply::ack())
        }
    }
}
