//! Tiered conversation memory for convmem.
//!
//! Hot-tier backends ([`InMemoryHotStore`], [`NoopHotStore`], and Redis),
//! durable backends (SQLite, PostgreSQL, in-memory), and the
//! [`MemoryOrchestrator`] that ties them to a summarizer.

pub mod escalation;
pub mod factory;
pub mod in_memory;
pub mod noop;
pub mod orchestrator;

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
pub(crate) mod testing;

pub use factory::{open_durable_store, open_hot_store, open_orchestrator};
pub use in_memory::{InMemoryDurableStore, InMemoryHotStore};
pub use noop::NoopHotStore;
pub use orchestrator::{
    Degradation, DegradedStep, EscalationOutcome, IngestReport, MemoryOrchestrator,
    TransferReport,
};

#[cfg(feature = "redis")]
pub use redis_store::RedisHotStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDurableStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDurableStore;
