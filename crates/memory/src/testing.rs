//! Test doubles: failure-injecting stores and a scripted summarizer.

use crate::in_memory::{InMemoryDurableStore, InMemoryHotStore};
use async_trait::async_trait;
use convmem_core::error::{CollaboratorError, DurableError, HotStoreError, ProviderError};
use convmem_core::memory::{
    ChatLogEntry, ChatLogPage, DurableStore, HotStore, LongTermBatch, ShortTermSnapshot,
};
use convmem_core::provider::Summarizer;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// An in-memory hot store whose listed commands fail as if Redis were down.
pub struct FlakyHotStore {
    pub inner: InMemoryHotStore,
    failing: HashSet<&'static str>,
}

impl FlakyHotStore {
    pub fn failing(commands: &[&'static str]) -> Self {
        Self {
            inner: InMemoryHotStore::new(),
            failing: commands.iter().copied().collect(),
        }
    }

    pub fn down() -> Self {
        Self::failing(&[
            "LPUSH", "RPUSH", "LTRIM", "LRANGE", "GET", "SET", "INCR", "DEL", "REPLACE",
        ])
    }

    fn check(&self, command: &'static str) -> Result<(), HotStoreError> {
        if self.failing.contains(command) {
            Err(HotStoreError::Unavailable(format!("{command}: connection refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HotStore for FlakyHotStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<u64, HotStoreError> {
        self.check("LPUSH")?;
        self.inner.push_front(key, value).await
    }

    async fn push_back(&self, key: &str, values: &[String]) -> Result<u64, HotStoreError> {
        self.check("RPUSH")?;
        self.inner.push_back(key, values).await
    }

    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<(), HotStoreError> {
        self.check("LTRIM")?;
        self.inner.trim(key, start, stop).await
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, HotStoreError> {
        self.check("LRANGE")?;
        self.inner.range(key, start, stop).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        self.check("GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HotStoreError> {
        self.check("SET")?;
        self.inner.set(key, value).await
    }

    async fn incr(&self, key: &str) -> Result<i64, HotStoreError> {
        self.check("INCR")?;
        self.inner.incr(key).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        self.check("DEL")?;
        self.inner.delete(keys).await
    }

    async fn replace_list(&self, key: &str, values: &[String]) -> Result<(), HotStoreError> {
        self.check("REPLACE")?;
        self.inner.replace_list(key, values).await
    }
}

/// Which durable write path should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableFault {
    ChatLog,
    Snapshot,
    LongTerm,
}

/// An in-memory durable store with one failing write path.
pub struct FlakyDurableStore {
    pub inner: InMemoryDurableStore,
    fault: DurableFault,
}

impl FlakyDurableStore {
    pub fn new(fault: DurableFault) -> Self {
        Self {
            inner: InMemoryDurableStore::new(),
            fault,
        }
    }

    fn check(&self, path: DurableFault) -> Result<(), DurableError> {
        if self.fault == path {
            Err(DurableError::PersistFailure(format!("{path:?} write rejected")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for FlakyDurableStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> Result<(), DurableError> {
        self.check(DurableFault::ChatLog)?;
        self.inner.append_chat_log(entry).await
    }

    async fn chat_log_page(
        &self,
        user_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<ChatLogPage, DurableError> {
        self.inner.chat_log_page(user_id, skip, limit).await
    }

    async fn conversation_log(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLogEntry>, DurableError> {
        self.inner.conversation_log(user_id, conversation_id).await
    }

    async fn upsert_snapshot(&self, snapshot: &ShortTermSnapshot) -> Result<(), DurableError> {
        self.check(DurableFault::Snapshot)?;
        self.inner.upsert_snapshot(snapshot).await
    }

    async fn find_snapshot(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ShortTermSnapshot>, DurableError> {
        self.check(DurableFault::Snapshot)?;
        self.inner.find_snapshot(user_id, conversation_id).await
    }

    async fn append_long_term_batch(&self, batch: &LongTermBatch) -> Result<(), DurableError> {
        self.check(DurableFault::LongTerm)?;
        self.inner.append_long_term_batch(batch).await
    }

    async fn long_term_batches(&self, user_id: &str) -> Result<Vec<LongTermBatch>, DurableError> {
        self.inner.long_term_batches(user_id).await
    }
}

/// A summarizer that records its inputs and replies from a script.
#[derive(Default)]
pub struct ScriptedSummarizer {
    pub summarize_calls: Mutex<Vec<String>>,
    pub extract_calls: Mutex<Vec<(String, usize)>>,
    extraction: Option<String>,
    fail: bool,
    delay: Option<Duration>,
}

impl ScriptedSummarizer {
    /// Summaries come back as `summary #{call}`; extraction returns `extraction`.
    pub fn replying(extraction: &str) -> Self {
        Self {
            extraction: Some(extraction.to_string()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying("- late")
        }
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.lock().unwrap().len()
    }

    pub fn extract_count(&self) -> usize {
        self.extract_calls.lock().unwrap().len()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String, CollaboratorError> {
        let call = {
            let mut calls = self.summarize_calls.lock().unwrap();
            calls.push(transcript.to_string());
            calls.len()
        };
        self.pause().await;
        if self.fail {
            return Err(ProviderError::Network("connection reset".into()).into());
        }
        Ok(format!("summary #{call}"))
    }

    async fn extract(&self, transcript: &str, points: usize) -> Result<String, CollaboratorError> {
        self.extract_calls
            .lock()
            .unwrap()
            .push((transcript.to_string(), points));
        self.pause().await;
        if self.fail {
            return Err(ProviderError::Network("connection reset".into()).into());
        }
        Ok(self.extraction.clone().unwrap_or_default())
    }
}
