//! The runtime state store
//!
//! Single logical writer: every mutation takes the write lock, completes
//! fully, then broadcasts the new snapshot. Readers only ever see whole
//! snapshots.

use crate::state::types::{
    CodeSuggestion, ReplySuggestion, RuntimeState, StatePatch, Transcript,
};
use tokio::sync::{broadcast, RwLock};

/// Capacity of the snapshot broadcast; a slow subscriber skips to the
/// newest snapshot rather than stalling writers.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Authoritative in-memory session state.
pub struct StateStore {
    state: RwLock<RuntimeState>,
    tx: broadcast::Sender<RuntimeState>,
}

impl StateStore {
    /// Create a store with default state.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RuntimeState::default()),
            tx,
        }
    }

    /// Full immutable snapshot.
    pub async fn get(&self) -> RuntimeState {
        self.state.read().await.clone()
    }

    /// Subscribe to snapshot broadcasts (one per completed mutation).
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeState> {
        self.tx.subscribe()
    }

    /// Apply a shallow patch and broadcast the result.
    pub async fn update(&self, patch: StatePatch) -> RuntimeState {
        let mut guard = self.state.write().await;
        patch.apply(&mut guard);
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
        snapshot
    }

    /// Append a finalized transcript fragment.
    ///
    /// Non-final fragments are dropped silently; returns whether the
    /// entry was appended.
    pub async fn add_transcript(&self, entry: Transcript) -> bool {
        if !entry.is_final {
            tracing::trace!(speaker = ?entry.speaker, "Dropping non-final transcript fragment");
            return false;
        }
        let mut guard = self.state.write().await;
        guard.transcripts.push(entry);
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
        true
    }

    /// Append a reply suggestion.
    pub async fn add_reply_suggestion(&self, entry: ReplySuggestion) {
        let mut guard = self.state.write().await;
        guard.reply_suggestions.push(entry);
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
    }

    /// Append a code suggestion.
    pub async fn add_code_suggestion(&self, entry: CodeSuggestion) {
        let mut guard = self.state.write().await;
        guard.code_suggestions.push(entry);
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
    }

    /// Reset the transcript list.
    pub async fn clear_transcripts(&self) {
        let mut guard = self.state.write().await;
        guard.transcripts.clear();
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
    }

    /// Reset both suggestion lists.
    pub async fn clear_suggestions(&self) {
        let mut guard = self.state.write().await;
        guard.reply_suggestions.clear();
        guard.code_suggestions.clear();
        let snapshot = guard.clone();
        drop(guard);
        self.publish(&snapshot);
    }

    fn publish(&self, snapshot: &RuntimeState) {
        // No subscribers is fine; the send result only reports that.
        let _ = self.tx.send(snapshot.clone());
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
