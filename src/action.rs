//! Action lock
//!
//! Mutual-exclusion gate for exclusive, long-running user actions
//! (screenshot capture, suggestion generation). First come, first
//! served, no queueing: a contending request is rejected immediately
//! and told who holds the lock.

use tokio::sync::Mutex;

/// Outcome of an acquisition attempt. Contention is a value, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    /// Rejected; `holder` is the currently-running action
    Busy { holder: String },
}

/// At most one holder at any instant.
pub struct ActionLock {
    current: Mutex<Option<String>>,
}

impl ActionLock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Try to take the lock for `action_id`.
    pub async fn try_acquire(&self, action_id: &str) -> Acquire {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(holder) => {
                tracing::info!(
                    requested = action_id,
                    holder = holder.as_str(),
                    "Action blocked by running action"
                );
                Acquire::Busy {
                    holder: holder.clone(),
                }
            }
            None => {
                *current = Some(action_id.to_string());
                Acquire::Acquired
            }
        }
    }

    /// Release the lock. Only effective when `action_id` is the current
    /// holder; a stale release from a superseded action changes nothing.
    pub async fn release(&self, action_id: &str) {
        let mut current = self.current.lock().await;
        if current.as_deref() == Some(action_id) {
            *current = None;
        } else {
            tracing::debug!(
                requested = action_id,
                holder = ?current.as_deref(),
                "Ignoring release from non-holder"
            );
        }
    }

    /// The currently-running action, if any.
    pub async fn current(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    pub async fn is_locked(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

impl Default for ActionLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_is_rejected_with_holder() {
        let lock = ActionLock::new();
        assert_eq!(lock.try_acquire("screenshot_capture").await, Acquire::Acquired);
        assert_eq!(
            lock.try_acquire("code_suggestion").await,
            Acquire::Busy {
                holder: "screenshot_capture".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stale_release_does_not_clear_holder() {
        let lock = ActionLock::new();
        lock.try_acquire("screenshot_capture").await;

        // A release from an action that never got the lock is a no-op.
        lock.release("code_suggestion").await;
        assert_eq!(lock.current().await.as_deref(), Some("screenshot_capture"));

        lock.release("screenshot_capture").await;
        assert!(!lock.is_locked().await);
        assert_eq!(lock.try_acquire("code_suggestion").await, Acquire::Acquired);
    }

    #[tokio::test]
    async fn test_reacquire_after_release() {
        let lock = ActionLock::new();
        lock.try_acquire("a").await;
        lock.release("a").await;
        assert_eq!(lock.try_acquire("a").await, Acquire::Acquired);
    }

    #[tokio::test]
    async fn test_release_when_unlocked_is_noop() {
        let lock = ActionLock::new();
        lock.release("a").await;
        assert!(!lock.is_locked().await);
    }
}
