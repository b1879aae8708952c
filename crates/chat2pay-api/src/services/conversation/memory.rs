use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::store::SessionStore;
use super::types::{Conversation, Turn};

pub const HISTORY_KEY_PREFIX: &str = "history_context";

pub fn history_key(session_id: &str) -> String {
    format!("{}:{}", HISTORY_KEY_PREFIX, session_id)
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Prunes a session's lock entry on drop once nobody else holds or awaits it
struct LockEntry {
    locks: Arc<LockMap>,
    session_id: String,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Exclusive access to one session's history for the duration of a turn.
pub struct SessionGuard {
    // released before the entry is pruned
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry,
}

/// Per-session conversation memory over a TTL key/value store
pub struct SessionMemory {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    persona: String,
    locks: Arc<LockMap>,
}

impl SessionMemory {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration, persona: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            persona: persona.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Serialize history mutations for one session. Hold the guard across
    /// the whole read-modify-write.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // a waiter cancelled here drops `acquire` (and its handle) before `entry`
        let entry = LockEntry {
            locks: self.locks.clone(),
            session_id: session_id.to_string(),
        };
        let acquire = lock.lock_owned();

        SessionGuard {
            _guard: acquire.await,
            _entry: entry,
        }
    }

    /// Number of sessions with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Load a session's conversation. A corrupted blob reads as absent.
    pub async fn get(&self, session_id: &str) -> Result<Option<Conversation>> {
        let key = history_key(session_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Conversation>(&raw) {
            Ok(conversation) => Ok(Some(conversation)),
            Err(e) => {
                warn!(
                    "Corrupted history for session {}, starting fresh: {}",
                    session_id, e
                );
                Ok(None)
            }
        }
    }

    /// Append turns in one read-modify-write and refresh the TTL.
    /// Callers are expected to hold the session's [`SessionGuard`].
    pub async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<Conversation> {
        let mut conversation = self
            .get(session_id)
            .await?
            .unwrap_or_else(|| Conversation::with_persona(&self.persona));
        conversation.ensure_persona(&self.persona);
        conversation.extend(turns);

        self.write(session_id, &conversation).await?;

        debug!(
            "Session {} history now has {} turns",
            session_id,
            conversation.len()
        );

        Ok(conversation)
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        self.store.delete(&history_key(session_id)).await?;
        debug!("Session {} history cleared", session_id);
        Ok(())
    }

    /// Create the conversation with its persona turn if the session has none.
    /// Returns the conversation and whether it was newly created.
    pub async fn new_connection(&self, session_id: &str) -> Result<(Conversation, bool)> {
        if let Some(existing) = self.get(session_id).await? {
            return Ok((existing, false));
        }

        let conversation = Conversation::with_persona(&self.persona);
        self.write(session_id, &conversation).await?;
        Ok((conversation, true))
    }

    async fn write(&self, session_id: &str, conversation: &Conversation) -> Result<()> {
        let encoded = serde_json::to_string(conversation)?;
        self.store
            .set(&history_key(session_id), &encoded, self.ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::store::{InMemorySessionStore, MockSessionStore};
    use crate::services::conversation::types::Role;

    fn memory() -> (SessionMemory, InMemorySessionStore) {
        let store = InMemorySessionStore::new();
        let memory = SessionMemory::new(
            Arc::new(store.clone()),
            Duration::from_secs(7200),
            "persona",
        );
        (memory, store)
    }

    #[tokio::test]
    async fn test_append_then_get_round_trip() {
        let (memory, _) = memory();
        memory
            .append("s1", vec![Turn::human("hi"), Turn::assistant("halo")])
            .await
            .unwrap();

        let conv = memory.get("s1").await.unwrap().unwrap();
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.turns()[0].role, Role::System);
        assert_eq!(conv.last().unwrap().text, "halo");

        memory.reset("s1").await.unwrap();
        assert!(memory.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_history_starts_fresh() {
        let (memory, store) = memory();
        store
            .set(&history_key("s1"), "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(memory.get("s1").await.unwrap().is_none());

        let conv = memory.append("s1", vec![Turn::human("hi")]).await.unwrap();
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn test_new_connection_is_idempotent() {
        let (memory, _) = memory();
        let (_, created) = memory.new_connection("s1").await.unwrap();
        assert!(created);
        memory.append("s1", vec![Turn::human("hi")]).await.unwrap();

        let (conv, created) = memory.new_connection("s1").await.unwrap();
        assert!(!created);
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let mut store = MockSessionStore::new();
        store
            .expect_get()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let memory = SessionMemory::new(Arc::new(store), Duration::from_secs(60), "p");

        assert!(memory.get("s1").await.is_err());
        assert!(memory.new_connection("s1").await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_lock_entry() {
        let (memory, _) = memory();

        let holder = memory.lock("s1").await;
        let mut waiter = Box::pin(memory.lock("s1"));
        assert!(futures::poll!(&mut waiter).is_pending());

        // the holder releases while the waiter is still queued
        drop(holder);
        assert_eq!(memory.active_locks(), 1);

        drop(waiter);
        assert_eq!(memory.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_waiter_timing_out_behind_holder() {
        let (memory, _) = memory();

        let holder = memory.lock("s1").await;
        let waited = tokio::time::timeout(Duration::from_millis(20), memory.lock("s1")).await;
        assert!(waited.is_err());

        drop(holder);
        assert_eq!(memory.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let (memory, _) = memory();
        let memory = Arc::new(memory);

        let mut handles = Vec::new();
        for i in 0..16 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                let _guard = memory.lock("s1").await;
                memory
                    .append("s1", vec![Turn::human(format!("m{i}"))])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let conv = memory.get("s1").await.unwrap().unwrap();
        assert_eq!(conv.len(), 17);
        assert_eq!(memory.active_locks(), 0);
    }
}
