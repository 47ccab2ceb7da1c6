//! The memory orchestrator: ingestion, escalation, and session transfer.
//!
//! The durable chat log is the only hard dependency: if a turn cannot be
//! appended there, [`MemoryOrchestrator::ingest`] fails and nothing else is
//! touched. Every hot-tier step and every secondary durable write after that
//! is best-effort and shows up in the returned report instead of an error.

use crate::escalation::{decode_turns, oldest_first, parse_points};
use convmem_config::MemoryConfig;
use convmem_core::error::{CollaboratorError, DurableError, HotStoreError};
use convmem_core::keyspace::{ConversationKeys, KeySpace};
use convmem_core::memory::{
    ChatLogEntry, ChatLogPage, DurableStore, HotStore, LongTermBatch, MemoryContext,
    ShortTermSnapshot,
};
use convmem_core::message::{Turn, transcript};
use convmem_core::provider::Summarizer;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The step whose effect was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedStep {
    RecentBuffer,
    ShortTermWindow,
    MessageCounter,
    Summary,
    LongTermHot,
    LongTermDurable,
    SnapshotRead,
    SnapshotWrite,
    SessionRead,
    SessionClear,
}

impl DegradedStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentBuffer => "recent_buffer",
            Self::ShortTermWindow => "short_term_window",
            Self::MessageCounter => "message_counter",
            Self::Summary => "summary",
            Self::LongTermHot => "long_term_hot",
            Self::LongTermDurable => "long_term_durable",
            Self::SnapshotRead => "snapshot_read",
            Self::SnapshotWrite => "snapshot_write",
            Self::SessionRead => "session_read",
            Self::SessionClear => "session_clear",
        }
    }
}

impl fmt::Display for DegradedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A swallowed failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    pub step: DegradedStep,
    pub reason: String,
}

/// What happened to one escalation during an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The counter was not at a multiple of the interval.
    NotTriggered,
    /// Triggered, but there was nothing to summarize.
    Skipped,
    Completed,
    /// The collaborator or the read feeding it failed; nothing was written.
    Failed(String),
}

impl EscalationOutcome {
    pub fn triggered(&self) -> bool {
        !matches!(self, Self::NotTriggered)
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Counter value after this turn, if it could be read.
    pub message_count: Option<u64>,
    pub summary: EscalationOutcome,
    pub long_term: EscalationOutcome,
    pub degradations: Vec<Degradation>,
}

impl IngestReport {
    fn new() -> Self {
        Self {
            message_count: None,
            summary: EscalationOutcome::NotTriggered,
            long_term: EscalationOutcome::NotTriggered,
            degradations: Vec::new(),
        }
    }

    /// True when the turn was logged but some cache or escalation state was lost.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
            || matches!(self.summary, EscalationOutcome::Failed(_))
            || matches!(self.long_term, EscalationOutcome::Failed(_))
    }
}

/// Result of a login or logout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Login: a snapshot was found. Logout: a snapshot was written.
    pub transferred: bool,
    pub degradations: Vec<Degradation>,
}

impl TransferReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

trait Degrade {
    fn degrade(&mut self, step: DegradedStep, reason: impl fmt::Display);
}

fn record(list: &mut Vec<Degradation>, step: DegradedStep, reason: impl fmt::Display) {
    warn!(step = %step, "Memory degraded: {reason}");
    list.push(Degradation {
        step,
        reason: reason.to_string(),
    });
}

impl Degrade for IngestReport {
    fn degrade(&mut self, step: DegradedStep, reason: impl fmt::Display) {
        record(&mut self.degradations, step, reason);
    }
}

impl Degrade for TransferReport {
    fn degrade(&mut self, step: DegradedStep, reason: impl fmt::Display) {
        record(&mut self.degradations, step, reason);
    }
}

fn encode(turn: &Turn) -> Result<String, HotStoreError> {
    serde_json::to_string(turn).map_err(|e| HotStoreError::Encoding(e.to_string()))
}

/// Wires the hot tier, the durable tier, and the summarizer together.
pub struct MemoryOrchestrator {
    hot: Arc<dyn HotStore>,
    durable: Arc<dyn DurableStore>,
    summarizer: Arc<dyn Summarizer>,
    keys: KeySpace,
    config: MemoryConfig,
}

impl MemoryOrchestrator {
    pub fn new(
        hot: Arc<dyn HotStore>,
        durable: Arc<dyn DurableStore>,
        summarizer: Arc<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            hot,
            durable,
            summarizer,
            keys: KeySpace::new(config.key_prefix.clone()),
            config,
        }
    }

    pub fn hot_store(&self) -> &Arc<dyn HotStore> {
        &self.hot
    }

    pub fn durable_store(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    fn last_recent_index(&self) -> i64 {
        self.config.recent_capacity as i64 - 1
    }

    /// Record a turn and run whatever escalations its count triggers.
    ///
    /// # Errors
    ///
    /// Returns the durable error when the chat-log append fails. In that case
    /// the turn is not ingested and the hot tier is left untouched.
    pub async fn ingest(
        &self,
        user_id: &str,
        conversation_id: &str,
        turn: Turn,
    ) -> Result<IngestReport, DurableError> {
        let entry = ChatLogEntry::from_turn(user_id, conversation_id, &turn);
        if let Err(e) = self.durable.append_chat_log(&entry).await {
            error!(user_id, conversation_id, "Chat log append failed: {e}");
            return Err(e);
        }

        let keys = self.keys.conversation(user_id, conversation_id);
        let mut report = IngestReport::new();

        if let Err(e) = self.push_recent(&keys, &turn).await {
            report.degrade(DegradedStep::RecentBuffer, e);
        }
        if let Err(e) = self.rebuild_short_term(&keys).await {
            report.degrade(DegradedStep::ShortTermWindow, e);
        }

        let count = match self.hot.incr(&keys.message_count).await {
            Ok(n) if n > 0 => n as u64,
            Ok(_) => {
                debug!(user_id, conversation_id, "Counter disabled, escalations skipped");
                return Ok(report);
            }
            Err(e) => {
                report.degrade(DegradedStep::MessageCounter, e);
                return Ok(report);
            }
        };
        report.message_count = Some(count);
        debug!(user_id, conversation_id, count, "Turn ingested");

        if count % self.config.summary_every == 0 {
            let outcome = self.escalate_summary(&keys, &mut report).await;
            report.summary = outcome;
        }
        if count % self.config.long_term_every == 0 {
            let outcome = self
                .escalate_long_term(user_id, conversation_id, &keys, &mut report)
                .await;
            report.long_term = outcome;
        }

        Ok(report)
    }

    async fn push_recent(&self, keys: &ConversationKeys, turn: &Turn) -> Result<(), HotStoreError> {
        self.hot.push_front(&keys.recent, &encode(turn)?).await?;
        self.hot.trim(&keys.recent, 0, self.last_recent_index()).await
    }

    /// Derive the short-term window from the recent buffer and replace it wholesale.
    async fn rebuild_short_term(&self, keys: &ConversationKeys) -> Result<(), HotStoreError> {
        let newest = self
            .hot
            .range(&keys.recent, 0, self.config.short_term_size as i64 - 1)
            .await?;
        let window: Vec<String> = newest.into_iter().rev().collect();
        self.hot.replace_list(&keys.short_term, &window).await
    }

    async fn bounded<F>(&self, operation: &'static str, call: F) -> Result<String, CollaboratorError>
    where
        F: Future<Output = Result<String, CollaboratorError>>,
    {
        let timeout_secs = self.config.collaborator_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout {
                operation,
                timeout_secs,
            }),
        }
    }

    /// Summarize the turns older than the short-term window into the summary slot.
    async fn escalate_summary(
        &self,
        keys: &ConversationKeys,
        report: &mut IngestReport,
    ) -> EscalationOutcome {
        let older = match self
            .hot
            .range(&keys.recent, self.config.short_term_size as i64, -1)
            .await
        {
            Ok(older) => oldest_first(&older),
            Err(e) => {
                report.degrade(DegradedStep::Summary, &e);
                return EscalationOutcome::Failed(e.to_string());
            }
        };
        if older.is_empty() {
            debug!(key = %keys.summary, "Nothing older than the short-term window yet");
            return EscalationOutcome::Skipped;
        }

        let text = transcript(&older);
        let summary = self
            .bounded("summarize", self.summarizer.summarize(&text))
            .await
            .and_then(|summary| {
                if summary.trim().is_empty() {
                    Err(CollaboratorError::EmptyResponse)
                } else {
                    Ok(summary)
                }
            });
        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                warn!(key = %keys.summary, "Slider summary abandoned: {e}");
                return EscalationOutcome::Failed(e.to_string());
            }
        };

        if let Err(e) = self.hot.set(&keys.summary, summary.trim()).await {
            report.degrade(DegradedStep::Summary, &e);
            return EscalationOutcome::Failed(e.to_string());
        }
        info!(key = %keys.summary, turns = older.len(), "Slider summary regenerated");
        EscalationOutcome::Completed
    }

    /// Extract a fixed-size point batch from the recent buffer.
    async fn escalate_long_term(
        &self,
        user_id: &str,
        conversation_id: &str,
        keys: &ConversationKeys,
        report: &mut IngestReport,
    ) -> EscalationOutcome {
        let recent = match self.hot.range(&keys.recent, 0, self.last_recent_index()).await {
            Ok(recent) => oldest_first(&recent),
            Err(e) => {
                report.degrade(DegradedStep::LongTermHot, &e);
                return EscalationOutcome::Failed(e.to_string());
            }
        };
        if recent.is_empty() {
            return EscalationOutcome::Skipped;
        }

        let wanted = self.config.long_term_points;
        let text = transcript(&recent);
        let response = match self
            .bounded("extract", self.summarizer.extract(&text, wanted))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id, conversation_id, "Long-term extraction abandoned: {e}");
                return EscalationOutcome::Failed(e.to_string());
            }
        };

        let points = parse_points(&response, wanted);
        if let Err(e) = self.hot.push_back(&keys.long_term, &points).await {
            report.degrade(DegradedStep::LongTermHot, e);
        }
        let batch = LongTermBatch::new(user_id, conversation_id, points);
        if let Err(e) = self.durable.append_long_term_batch(&batch).await {
            report.degrade(DegradedStep::LongTermDurable, e);
        }

        info!(user_id, conversation_id, batch_id = %batch.id, "Long-term points extracted");
        EscalationOutcome::Completed
    }

    /// Restore the short-term window and summary from the durable snapshot.
    pub async fn login(&self, user_id: &str, conversation_id: &str) -> TransferReport {
        let mut report = TransferReport::default();
        let snapshot = match self.durable.find_snapshot(user_id, conversation_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(user_id, conversation_id, "No snapshot, first session");
                return report;
            }
            Err(e) => {
                report.degrade(DegradedStep::SnapshotRead, e);
                return report;
            }
        };
        report.transferred = true;
        let keys = self.keys.conversation(user_id, conversation_id);

        let window: Result<Vec<String>, HotStoreError> =
            snapshot.messages.iter().map(encode).collect();
        let restored = match window {
            Ok(window) => self.hot.replace_list(&keys.short_term, &window).await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            report.degrade(DegradedStep::ShortTermWindow, e);
        }

        if !snapshot.summary.is_empty() {
            if let Err(e) = self.hot.set(&keys.summary, &snapshot.summary).await {
                report.degrade(DegradedStep::Summary, e);
            }
        }

        info!(
            user_id,
            conversation_id,
            turns = snapshot.messages.len(),
            "Short-term memory restored"
        );
        report
    }

    /// Persist the short-term window and summary, then clear the session keys.
    ///
    /// When either hot read fails the snapshot write is skipped, so a partial
    /// read never replaces a complete snapshot.
    pub async fn logout(&self, user_id: &str, conversation_id: &str) -> TransferReport {
        let mut report = TransferReport::default();
        let keys = self.keys.conversation(user_id, conversation_id);

        let messages = self.hot.range(&keys.short_term, 0, -1).await;
        let summary = self.hot.get(&keys.summary).await;

        match (messages, summary) {
            (Ok(messages), Ok(summary)) => {
                let messages = decode_turns(&messages);
                let summary = summary.unwrap_or_default();
                if messages.is_empty() && summary.is_empty() {
                    debug!(user_id, conversation_id, "Nothing to snapshot");
                } else {
                    let snapshot = ShortTermSnapshot {
                        user_id: user_id.to_string(),
                        conversation_id: conversation_id.to_string(),
                        messages,
                        summary,
                        updated_at: chrono::Utc::now(),
                    };
                    match self.durable.upsert_snapshot(&snapshot).await {
                        Ok(()) => report.transferred = true,
                        Err(e) => report.degrade(DegradedStep::SnapshotWrite, e),
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => report.degrade(DegradedStep::SessionRead, e),
        }

        if let Err(e) = self.hot.delete(&keys.session_keys()).await {
            report.degrade(DegradedStep::SessionClear, e);
        }

        info!(
            user_id,
            conversation_id,
            saved = report.transferred,
            "Session closed"
        );
        report
    }

    /// Assemble the memory an agent sees. Each field falls back to empty on failure.
    pub async fn get_context(&self, user_id: &str, conversation_id: &str) -> MemoryContext {
        let keys = self.keys.conversation(user_id, conversation_id);
        let mut context = MemoryContext::default();

        match self.hot.range(&keys.short_term, 0, -1).await {
            Ok(window) => context.short_term_messages = decode_turns(&window),
            Err(e) => warn!(user_id, conversation_id, "Short-term read failed: {e}"),
        }
        match self.hot.get(&keys.summary).await {
            Ok(summary) => context.slider_summary = summary.unwrap_or_default(),
            Err(e) => warn!(user_id, conversation_id, "Summary read failed: {e}"),
        }
        match self.hot.range(&keys.long_term, 0, -1).await {
            Ok(points) => context.long_term_points = points,
            Err(e) => warn!(user_id, "Long-term read failed: {e}"),
        }
        match self.hot.range(&keys.recent, 0, self.last_recent_index()).await {
            Ok(recent) => context.recent_history = oldest_first(&recent),
            Err(e) => warn!(user_id, conversation_id, "Recent buffer read failed: {e}"),
        }

        context
    }

    /// One page of a user's durable chat log, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<ChatLogPage, DurableError> {
        self.durable.chat_log_page(user_id, skip, limit).await
    }

    /// Close both stores.
    pub async fn close(&self) {
        self.hot.close().await;
        self.durable.close().await;
        info!("Memory stores closed");
    }
}
