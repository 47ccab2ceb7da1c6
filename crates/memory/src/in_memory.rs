//! In-memory stores, useful for testing and single-process deployments.
//!
//! [`InMemoryHotStore`] mimics the Redis list/string/counter commands the
//! orchestrator relies on, including negative range indices.
//! [`InMemoryDurableStore`] keeps the three durable collections in vectors.

use async_trait::async_trait;
use convmem_core::error::{DurableError, HotStoreError};
use convmem_core::memory::{
    ChatLogEntry, ChatLogPage, DurableStore, HotStore, LongTermBatch, ShortTermSnapshot,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum HotValue {
    List(VecDeque<String>),
    Str(String),
}

/// Resolve Redis-style inclusive indices against a list of length `len`.
///
/// Returns `None` when the range selects nothing.
pub(crate) fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn wrong_type(command: &str) -> HotStoreError {
    HotStoreError::CommandFailed {
        command: command.into(),
        reason: "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
    }
}

/// A process-local hot store.
pub struct InMemoryHotStore {
    data: Arc<RwLock<HashMap<String, HotValue>>>,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.data.read().await.contains_key(key)
    }
}

impl Default for InMemoryHotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<u64, HotStoreError> {
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| HotValue::List(VecDeque::new()))
        {
            HotValue::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len() as u64)
            }
            HotValue::Str(_) => Err(wrong_type("LPUSH")),
        }
    }

    async fn push_back(&self, key: &str, values: &[String]) -> Result<u64, HotStoreError> {
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| HotValue::List(VecDeque::new()))
        {
            HotValue::List(list) => {
                list.extend(values.iter().cloned());
                Ok(list.len() as u64)
            }
            HotValue::Str(_) => Err(wrong_type("RPUSH")),
        }
    }

    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<(), HotStoreError> {
        let mut data = self.data.write().await;
        let Some(value) = data.get_mut(key) else {
            return Ok(());
        };
        let HotValue::List(list) = value else {
            return Err(wrong_type("LTRIM"));
        };
        match normalize_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => {
                data.remove(key);
            }
        }
        Ok(())
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, HotStoreError> {
        let data = self.data.read().await;
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(HotValue::Str(_)) => Err(wrong_type("LRANGE")),
            Some(HotValue::List(list)) => Ok(match normalize_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        match self.data.read().await.get(key) {
            None => Ok(None),
            Some(HotValue::Str(s)) => Ok(Some(s.clone())),
            Some(HotValue::List(_)) => Err(wrong_type("GET")),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HotStoreError> {
        self.data
            .write()
            .await
            .insert(key.to_string(), HotValue::Str(value.to_string()));
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, HotStoreError> {
        let mut data = self.data.write().await;
        let current = match data.get(key) {
            None => 0,
            Some(HotValue::Str(s)) => s.parse::<i64>().map_err(|_| HotStoreError::CommandFailed {
                command: "INCR".into(),
                reason: "value is not an integer".into(),
            })?,
            Some(HotValue::List(_)) => return Err(wrong_type("INCR")),
        };
        let next = current + 1;
        data.insert(key.to_string(), HotValue::Str(next.to_string()));
        Ok(next)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        let mut data = self.data.write().await;
        Ok(keys.iter().filter(|k| data.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn replace_list(&self, key: &str, values: &[String]) -> Result<(), HotStoreError> {
        // Single write lock keeps the replacement atomic for readers.
        let mut data = self.data.write().await;
        if values.is_empty() {
            data.remove(key);
        } else {
            data.insert(
                key.to_string(),
                HotValue::List(values.iter().cloned().collect()),
            );
        }
        Ok(())
    }
}

/// A process-local durable store. Contents are lost on restart.
pub struct InMemoryDurableStore {
    chat_log: Arc<RwLock<Vec<ChatLogEntry>>>,
    snapshots: Arc<RwLock<HashMap<(String, String), ShortTermSnapshot>>>,
    batches: Arc<RwLock<Vec<LongTermBatch>>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self {
            chat_log: Arc::new(RwLock::new(Vec::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            batches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Total rows in the chat log across all users.
    pub async fn chat_log_len(&self) -> usize {
        self.chat_log.read().await.len()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> Result<(), DurableError> {
        self.chat_log.write().await.push(entry.clone());
        Ok(())
    }

    async fn chat_log_page(
        &self,
        user_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<ChatLogPage, DurableError> {
        let log = self.chat_log.read().await;
        let mut entries: Vec<ChatLogEntry> = log
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        let total = entries.len() as u64;
        // Stable sort keeps insertion order for equal timestamps; reverse gives newest first.
        entries.sort_by_key(|e| e.timestamp);
        entries.reverse();
        let entries = entries
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();
        Ok(ChatLogPage { entries, total })
    }

    async fn conversation_log(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLogEntry>, DurableError> {
        let log = self.chat_log.read().await;
        Ok(log
            .iter()
            .filter(|e| e.user_id == user_id && e.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn upsert_snapshot(&self, snapshot: &ShortTermSnapshot) -> Result<(), DurableError> {
        self.snapshots.write().await.insert(
            (
                snapshot.user_id.clone(),
                snapshot.conversation_id.clone(),
            ),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn find_snapshot(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ShortTermSnapshot>, DurableError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&(user_id.to_string(), conversation_id.to_string()))
            .cloned())
    }

    async fn append_long_term_batch(&self, batch: &LongTermBatch) -> Result<(), DurableError> {
        self.batches.write().await.push(batch.clone());
        Ok(())
    }

    async fn long_term_batches(&self, user_id: &str) -> Result<Vec<LongTermBatch>, DurableError> {
        Ok(self
            .batches
            .read()
            .await
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }
}
