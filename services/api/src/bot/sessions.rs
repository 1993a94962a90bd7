//! services/api/src/bot/sessions.rs
//!
//! The in-memory session store: one conversation-state record per sender,
//! keyed by the sender address.

use eco_report_core::domain::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A concurrency-safe map of per-sender sessions.
///
/// The outer mutex only guards the map itself and is held for the duration of
/// a lookup. Each entry is its own `Arc<Mutex<Session>>`: the message handler
/// locks the entry for the whole get-modify-save cycle, so messages from one
/// sender are processed in arrival order while other senders' handlers run
/// in parallel.
#[derive(Default)]
pub struct SessionMap {
    inner: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session slot for `sender_id`, creating a fresh `Intro`
    /// session on first contact.
    pub async fn entry(&self, sender_id: &str) -> Arc<Mutex<Session>> {
        let mut map = self.inner.lock().await;
        map.entry(sender_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(sender_id))))
            .clone()
    }

    /// Whether a session exists for `sender_id`.
    pub async fn contains(&self, sender_id: &str) -> bool {
        self.inner.lock().await.contains_key(sender_id)
    }

    /// Number of tracked sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eco_report_core::domain::Stage;

    #[tokio::test]
    async fn entry_creates_one_intro_session_per_sender() {
        let map = SessionMap::new();
        assert!(map.is_empty().await);

        let slot = map.entry("a@c.us").await;
        assert_eq!(slot.lock().await.stage, Stage::Intro);

        // Same sender gets the same slot back.
        let again = map.entry("a@c.us").await;
        assert!(Arc::ptr_eq(&slot, &again));

        map.entry("b@c.us").await;
        assert_eq!(map.len().await, 2);
    }

    #[tokio::test]
    async fn mutations_survive_via_the_shared_slot() {
        let map = SessionMap::new();
        {
            let slot = map.entry("a@c.us").await;
            slot.lock().await.stage = Stage::Done;
        }
        let slot = map.entry("a@c.us").await;
        assert_eq!(slot.lock().await.stage, Stage::Done);
    }
}
