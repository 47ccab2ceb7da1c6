//! Store traits for the two memory tiers.
//!
//! The hot tier is a Redis-shaped key-value store (lists, strings, counters)
//! holding the live state of active sessions. The durable tier is a document
//! store with three independent collections: the chat log, short-term
//! snapshots, and long-term point batches.
//!
//! Implementations: Redis, in-memory and no-op for the hot tier; SQLite,
//! PostgreSQL and in-memory for the durable tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DurableError, HotStoreError};
use crate::message::{Role, Turn};

/// One permanent row of the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatLogEntry {
    pub fn from_turn(user_id: &str, conversation_id: &str, turn: &Turn) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            role: turn.role(),
            content: turn.content().to_string(),
            timestamp: turn.timestamp(),
        }
    }

    pub fn to_turn(&self) -> Turn {
        Turn::at(self.role, self.content.clone(), self.timestamp)
    }
}

/// A page of the chat log, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLogPage {
    pub entries: Vec<ChatLogEntry>,
    pub total: u64,
}

/// Durable copy of a session's short-term state. One row per (user, conversation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermSnapshot {
    pub user_id: String,
    pub conversation_id: String,
    pub messages: Vec<Turn>,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

/// One immutable long-term extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermBatch {
    pub id: String,
    pub user_id: String,
    pub points: Vec<String>,
    pub source_conversation_id: String,
    pub created_at: DateTime<Utc>,
}

impl LongTermBatch {
    pub fn new(user_id: &str, source_conversation_id: &str, points: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            points,
            source_conversation_id: source_conversation_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Everything the agent sees of its memory for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    /// The short-term window, oldest first.
    pub short_term_messages: Vec<Turn>,
    /// Latest slider summary, empty when none has been generated.
    pub slider_summary: String,
    /// Every long-term point the user has accumulated.
    pub long_term_points: Vec<String>,
    /// The recent buffer, oldest first.
    pub recent_history: Vec<Turn>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.short_term_messages.is_empty()
            && self.slider_summary.is_empty()
            && self.long_term_points.is_empty()
            && self.recent_history.is_empty()
    }
}

/// The volatile tier.
///
/// Index arguments follow Redis list semantics: inclusive on both ends,
/// negative values count from the tail (`-1` is the last element).
#[async_trait]
pub trait HotStore: Send + Sync {
    /// The backend name (e.g., "redis", "memory", "none").
    fn name(&self) -> &str;

    /// Prepend a value. Returns the new list length.
    async fn push_front(&self, key: &str, value: &str) -> Result<u64, HotStoreError>;

    /// Append values in order. Returns the new list length.
    async fn push_back(&self, key: &str, values: &[String]) -> Result<u64, HotStoreError>;

    /// Keep only the elements in `start..=stop`.
    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<(), HotStoreError>;

    /// Read the elements in `start..=stop`. Missing keys read as empty.
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, HotStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), HotStoreError>;

    /// Atomically increment a counter and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, HotStoreError>;

    /// Delete keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, HotStoreError>;

    /// Replace a list wholesale.
    ///
    /// The default is delete-then-append; backends with transactions should
    /// make this atomic.
    async fn replace_list(&self, key: &str, values: &[String]) -> Result<(), HotStoreError> {
        self.delete(&[key.to_string()]).await?;
        if !values.is_empty() {
            self.push_back(key, values).await?;
        }
        Ok(())
    }

    /// Health check: can we reach the store?
    async fn ping(&self) -> Result<(), HotStoreError> {
        Ok(())
    }

    /// Release connections. Further calls may fail.
    async fn close(&self) {}
}

/// The persistent tier.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "postgres", "memory").
    fn name(&self) -> &str;

    /// Insert one chat-log row. Must not return before the row is committed.
    async fn append_chat_log(&self, entry: &ChatLogEntry) -> Result<(), DurableError>;

    /// A user's chat log across conversations, newest first.
    async fn chat_log_page(
        &self,
        user_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<ChatLogPage, DurableError>;

    /// One conversation's chat log, oldest first.
    async fn conversation_log(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLogEntry>, DurableError>;

    /// Insert or fully replace the snapshot for (user, conversation).
    async fn upsert_snapshot(&self, snapshot: &ShortTermSnapshot) -> Result<(), DurableError>;

    async fn find_snapshot(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ShortTermSnapshot>, DurableError>;

    /// Insert a new batch. Never updates an existing one.
    async fn append_long_term_batch(&self, batch: &LongTermBatch) -> Result<(), DurableError>;

    /// A user's batches, oldest first.
    async fn long_term_batches(&self, user_id: &str) -> Result<Vec<LongTermBatch>, DurableError>;

    /// Close the connection pool.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_log_entry_keeps_turn_fields() {
        let turn = Turn::assistant("The capital is Paris");
        let entry = ChatLogEntry::from_turn("u1", "c1", &turn);
        assert!(!entry.id.is_empty());
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.to_turn(), turn);
    }

    #[test]
    fn default_context_is_empty() {
        let ctx = MemoryContext::default();
        assert!(ctx.is_empty());
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["slider_summary"], "");
        assert!(json["long_term_points"].as_array().unwrap().is_empty());
    }
}
