//! Deterministic naming of hot-tier regions.
//!
//! ```text
//! {prefix}:recent:{user}:{conversation}         → list of Turn JSON, newest first
//! {prefix}:short_term:{user}:{conversation}     → list of Turn JSON, oldest first
//! {prefix}:slider_summary:{user}:{conversation} → string
//! {prefix}:message_count:{user}:{conversation}  → integer counter
//! {prefix}:long_term:{user}                     → list of point strings
//! ```

use crate::error::KeySpaceError;
use serde::{Deserialize, Serialize};

/// A logical hot-tier region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    RecentBuffer,
    ShortTermWindow,
    Summary,
    LongTerm,
    MessageCount,
}

impl RegionKind {
    /// Every region scoped to a (user, conversation) pair.
    pub const CONVERSATION_SCOPED: [RegionKind; 4] = [
        RegionKind::RecentBuffer,
        RegionKind::ShortTermWindow,
        RegionKind::Summary,
        RegionKind::MessageCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::RecentBuffer => "recent_buffer",
            RegionKind::ShortTermWindow => "short_term_window",
            RegionKind::Summary => "summary",
            RegionKind::LongTerm => "long_term",
            RegionKind::MessageCount => "message_count",
        }
    }

    /// Segment used inside the key.
    fn segment(&self) -> &'static str {
        match self {
            RegionKind::RecentBuffer => "recent",
            RegionKind::ShortTermWindow => "short_term",
            RegionKind::Summary => "slider_summary",
            RegionKind::LongTerm => "long_term",
            RegionKind::MessageCount => "message_count",
        }
    }

    pub fn is_user_scoped(&self) -> bool {
        matches!(self, RegionKind::LongTerm)
    }
}

impl std::str::FromStr for RegionKind {
    type Err = KeySpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent_buffer" => Ok(RegionKind::RecentBuffer),
            "short_term_window" => Ok(RegionKind::ShortTermWindow),
            "summary" => Ok(RegionKind::Summary),
            "long_term" => Ok(RegionKind::LongTerm),
            "message_count" => Ok(RegionKind::MessageCount),
            other => Err(KeySpaceError::InvalidRegionKind(other.to_string())),
        }
    }
}

/// Pure mapping from region identity to a hot-store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a region to its key.
    ///
    /// `long_term` must be called without a conversation id; every other
    /// region requires one.
    pub fn key(
        &self,
        kind: RegionKind,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<String, KeySpaceError> {
        match (kind.is_user_scoped(), conversation_id) {
            (true, None) => Ok(format!("{}:{}:{user_id}", self.prefix, kind.segment())),
            (true, Some(_)) => Err(KeySpaceError::UnexpectedConversation(kind.as_str())),
            (false, Some(conv)) => Ok(format!(
                "{}:{}:{user_id}:{conv}",
                self.prefix,
                kind.segment()
            )),
            (false, None) => Err(KeySpaceError::MissingConversation(kind.as_str())),
        }
    }

    /// Resolve a region named by string (e.g. from an admin request).
    pub fn key_for(
        &self,
        kind: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<String, KeySpaceError> {
        self.key(kind.parse()?, user_id, conversation_id)
    }

    /// All keys of one conversation, resolved up front.
    pub fn conversation(&self, user_id: &str, conversation_id: &str) -> ConversationKeys {
        let key = |segment: &str| format!("{}:{segment}:{user_id}:{conversation_id}", self.prefix);
        ConversationKeys {
            recent: key(RegionKind::RecentBuffer.segment()),
            short_term: key(RegionKind::ShortTermWindow.segment()),
            summary: key(RegionKind::Summary.segment()),
            message_count: key(RegionKind::MessageCount.segment()),
            long_term: format!("{}:{}:{user_id}", self.prefix, RegionKind::LongTerm.segment()),
        }
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("convmem")
    }
}

/// Resolved keys for a (user, conversation) pair plus the user's long-term list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationKeys {
    pub recent: String,
    pub short_term: String,
    pub summary: String,
    pub message_count: String,
    pub long_term: String,
}

impl ConversationKeys {
    /// Keys cleared at logout. Never includes the user-scoped long-term list.
    pub fn session_keys(&self) -> Vec<String> {
        vec![
            self.recent.clone(),
            self.short_term.clone(),
            self.summary.clone(),
            self.message_count.clone(),
        ]
    }
}
