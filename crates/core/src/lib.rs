//! # convmem Core
//!
//! Domain types, traits, and error definitions for the convmem tiered
//! conversation memory. This crate has **no storage or HTTP dependencies**;
//! it defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each tier and collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping Redis/SQLite/PostgreSQL via configuration
//! - Testing the orchestrator with in-memory stores and scripted summarizers
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod keyspace;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{
    CollaboratorError, DurableError, Error, HotStoreError, KeySpaceError, ProviderError, Result,
};
pub use keyspace::{ConversationKeys, KeySpace, RegionKind};
pub use memory::{
    ChatLogEntry, ChatLogPage, DurableStore, HotStore, LongTermBatch, MemoryContext,
    ShortTermSnapshot,
};
pub use message::{Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Summarizer};
