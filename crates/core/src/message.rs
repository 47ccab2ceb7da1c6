//! Turn domain types.
//!
//! A turn is one message in a conversation. Turns are immutable value objects
//! that flow through the whole system:
//! user sends a message → orchestrator ingests it → hot and durable tiers store it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single conversation turn.
///
/// Fields are private so a turn cannot be mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Utc::now())
    }

    /// Create a turn with an explicit timestamp.
    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Render as a `role: content` transcript line.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Render turns (already oldest-first) as a newline-separated transcript.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(Turn::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}
