//! Chat identity to conversation thread mapping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of chats remembered at once.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default time a conversation survives without new messages.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the relay keeps the thread handle of each chat.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The thread for `chat_id`, if one is live.
    async fn get(&self, chat_id: i64) -> Option<String>;

    async fn put(&self, chat_id: i64, thread_id: String);

    /// Forget `chat_id`. Returns whether a live mapping existed.
    async fn remove(&self, chat_id: i64) -> bool;
}

struct Entry {
    thread_id: String,
    last_used: Instant,
}

/// Process-local store. Entries expire after `idle_ttl` without use; when
/// full, the least recently used entry is evicted. Nothing survives a
/// restart.
pub struct InMemoryConversationStore {
    entries: Mutex<HashMap<i64, Entry>>,
    capacity: usize,
    idle_ttl: Duration,
}

impl InMemoryConversationStore {
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            idle_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_used) > self.idle_ttl
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_IDLE_TTL)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, chat_id: i64) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&chat_id)?;
        if self.is_expired(entry, now) {
            entries.remove(&chat_id);
            debug!(chat_id, "conversation expired");
            return None;
        }
        entry.last_used = now;
        Some(entry.thread_id.clone())
    }

    async fn put(&self, chat_id: i64, thread_id: String) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(&chat_id) && entries.len() >= self.capacity {
            entries.retain(|_, e| now.duration_since(e.last_used) <= self.idle_ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(id, _)| *id);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    debug!(chat_id = oldest, "conversation evicted");
                }
            }
        }

        entries.insert(
            chat_id,
            Entry {
                thread_id,
                last_used: now,
            },
        );
    }

    async fn remove(&self, chat_id: i64) -> bool {
        let now = Instant::now();
        match self.entries.lock().await.remove(&chat_id) {
            Some(entry) => !self.is_expired(&entry, now),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = InMemoryConversationStore::default();
        assert_eq!(store.get(1).await, None);
        store.put(1, "thread_a".to_owned()).await;
        assert_eq!(store.get(1).await.as_deref(), Some("thread_a"));
    }

    #[tokio::test]
    async fn remove_forgets_mapping() {
        let store = InMemoryConversationStore::default();
        store.put(7, "thread_a".to_owned()).await;
        assert!(store.remove(7).await);
        assert!(!store.remove(7).await);
        assert_eq!(store.get(7).await, None);
    }

    #[tokio::test]
    async fn oldest_entry_evicted_at_capacity() {
        let store = InMemoryConversationStore::new(2, DEFAULT_IDLE_TTL);
        store.put(1, "t1".to_owned()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.put(2, "t2".to_owned()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        // Touching chat 1 makes chat 2 the least recently used.
        assert!(store.get(1).await.is_some());
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.put(3, "t3".to_owned()).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(2).await, None);
        assert_eq!(store.get(1).await.as_deref(), Some("t1"));
        assert_eq!(store.get(3).await.as_deref(), Some("t3"));
    }

    #[tokio::test]
    async fn replacing_existing_chat_does_not_evict() {
        let store = InMemoryConversationStore::new(2, DEFAULT_IDLE_TTL);
        store.put(1, "t1".to_owned()).await;
        store.put(2, "t2".to_owned()).await;
        store.put(2, "t2b".to_owned()).await;
        assert_eq!(store.get(1).await.as_deref(), Some("t1"));
        assert_eq!(store.get(2).await.as_deref(), Some("t2b"));
    }

    #[tokio::test]
    async fn idle_entries_expire() {
        let store = InMemoryConversationStore::new(10, Duration::from_millis(20));
        store.put(1, "t1".to_owned()).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get(1).await, None);
        assert_eq!(store.len().await, 0);
    }
}
