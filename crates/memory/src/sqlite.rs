//! SQLite durable store.
//!
//! Uses a single SQLite database file with three independent tables:
//! - `chat_log`: append-only record of every turn
//! - `short_term_snapshots`: one row per (user, conversation), upserted at logout
//! - `long_term_batches`: append-only point extractions
//!
//! Timestamps are stored as RFC 3339 text with a fixed microsecond precision
//! so that lexical order equals chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use convmem_core::error::DurableError;
use convmem_core::memory::{
    ChatLogEntry, ChatLogPage, DurableStore, LongTermBatch, ShortTermSnapshot,
};
use convmem_core::message::{Role, Turn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A production SQLite durable store.
pub struct SqliteDurableStore {
    pool: SqlitePool,
}

pub(crate) fn encode_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<DateTime<Utc>, DurableError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DurableError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

impl SqliteDurableStore {
    /// Open (creating if missing) a SQLite database and run migrations.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn open(path: &str, max_connections: u32) -> Result<Self, DurableError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| DurableError::Connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // Every pooled connection to `:memory:` would otherwise see its own database.
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DurableError::Connection(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite durable store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, DurableError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create tables and indexes. Idempotent.
    async fn run_migrations(&self) -> Result<(), DurableError> {
        let statements: [(&str, &str); 9] = [
            (
                "chat_log table",
                r#"
                CREATE TABLE IF NOT EXISTS chat_log (
                    iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    user_id         TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    timestamp       TEXT NOT NULL
                )
                "#,
            ),
            (
                "short_term_snapshots table",
                r#"
                CREATE TABLE IF NOT EXISTS short_term_snapshots (
                    user_id         TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    messages        TEXT NOT NULL DEFAULT '[]',
                    summary         TEXT NOT NULL DEFAULT '',
                    updated_at      TEXT NOT NULL,
                    PRIMARY KEY (user_id, conversation_id)
                )
                "#,
            ),
            (
                "long_term_batches table",
                r#"
                CREATE TABLE IF NOT EXISTS long_term_batches (
                    iid                    INTEGER PRIMARY KEY AUTOINCREMENT,
                    id                     TEXT UNIQUE NOT NULL,
                    user_id                TEXT NOT NULL,
                    points                 TEXT NOT NULL,
                    source_conversation_id TEXT NOT NULL,
                    created_at             TEXT NOT NULL
                )
                "#,
            ),
            (
                "chat_log user/conversation index",
                "CREATE INDEX IF NOT EXISTS idx_chat_log_user_conv ON chat_log(user_id, conversation_id)",
            ),
            (
                "chat_log timestamp index",
                "CREATE INDEX IF NOT EXISTS idx_chat_log_timestamp ON chat_log(timestamp DESC)",
            ),
            (
                "chat_log user index",
                "CREATE INDEX IF NOT EXISTS idx_chat_log_user ON chat_log(user_id, timestamp DESC)",
            ),
            (
                "snapshot updated_at index",
                "CREATE INDEX IF NOT EXISTS idx_snapshots_updated_at ON short_term_snapshots(updated_at)",
            ),
            (
                "long_term user index",
                "CREATE INDEX IF NOT EXISTS idx_long_term_user ON long_term_batches(user_id)",
            ),
            (
                "long_term created_at index",
                "CREATE INDEX IF NOT EXISTS idx_long_term_created_at ON long_term_batches(created_at)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DurableError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, DurableError>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| DurableError::QueryFailed(format!("{name} column: {e}")))
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ChatLogEntry, DurableError> {
        let role: String = Self::column(row, "role")?;
        let timestamp: String = Self::column(row, "timestamp")?;
        Ok(ChatLogEntry {
            id: Self::column(row, "id")?,
            user_id: Self::column(row, "user_id")?,
            conversation_id: Self::column(row, "conversation_id")?,
            role: Role::from_str(&role).map_err(DurableError::QueryFailed)?,
            content: Self::column(row, "content")?,
            timestamp: decode_time(&timestamp)?,
        })
    }

    fn row_to_batch(row: &sqlx::sqlite::SqliteRow) -> Result<LongTermBatch, DurableError> {
        let points: String = Self::column(row, "points")?;
        let created_at: String = Self::column(row, "created_at")?;
        Ok(LongTermBatch {
            id: Self::column(row, "id")?,
            user_id: Self::column(row, "user_id")?,
            points: serde_json::from_str(&points)
                .map_err(|e| DurableError::QueryFailed(format!("points column: {e}")))?,
            source_conversation_id: Self::column(row, "source_conversation_id")?,
            created_at: decode_time(&created_at)?,
        })
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> Result<(), DurableError> {
        sqlx::query(
            r#"
            INSERT INTO chat_log (id, user_id, conversation_id, role, content, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.conversation_id)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(encode_time(&entry.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| DurableError::PersistFailure(format!("chat_log INSERT failed: {e}")))?;

        debug!(id = %entry.id, "Appended chat log entry");
        Ok(())
    }

    async fn chat_log_page(
        &self,
        user_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<ChatLogPage, DurableError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_log
            WHERE user_id = ?1
            ORDER BY timestamp DESC, iid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DurableError::QueryFailed(format!("chat_log page: {e}")))?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM chat_log WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DurableError::QueryFailed(format!("chat_log count: {e}")))?
            .try_get("total")
            .map_err(|e| DurableError::QueryFailed(format!("total column: {e}")))?;

        Ok(ChatLogPage {
            entries: rows
                .iter()
                .map(Self::row_to_entry)
                .collect::<Result<_, _>>()?,
            total: total as u64,
        })
    }

    async fn conversation_log(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLogEntry>, DurableError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_log
            WHERE user_id = ?1 AND conversation_id = ?2
            ORDER BY iid ASC
            "#,
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DurableError::QueryFailed(format!("conversation log: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn upsert_snapshot(&self, snapshot: &ShortTermSnapshot) -> Result<(), DurableError> {
        let messages = serde_json::to_string(&snapshot.messages)
            .map_err(|e| DurableError::PersistFailure(format!("messages serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO short_term_snapshots (user_id, conversation_id, messages, summary, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, conversation_id) DO UPDATE SET
                messages = excluded.messages,
                summary = excluded.summary,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.user_id)
        .bind(&snapshot.conversation_id)
        .bind(&messages)
        .bind(&snapshot.summary)
        .bind(encode_time(&snapshot.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| DurableError::PersistFailure(format!("snapshot UPSERT failed: {e}")))?;

        debug!(
            user_id = %snapshot.user_id,
            conversation_id = %snapshot.conversation_id,
            "Upserted short-term snapshot"
        );
        Ok(())
    }

    async fn find_snapshot(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ShortTermSnapshot>, DurableError> {
        let row = sqlx::query(
            "SELECT * FROM short_term_snapshots WHERE user_id = ?1 AND conversation_id = ?2",
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DurableError::QueryFailed(format!("snapshot lookup: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages: String = Self::column(&row, "messages")?;
        let updated_at: String = Self::column(&row, "updated_at")?;
        let messages: Vec<Turn> = serde_json::from_str(&messages)
            .map_err(|e| DurableError::QueryFailed(format!("messages column: {e}")))?;

        Ok(Some(ShortTermSnapshot {
            user_id: Self::column(&row, "user_id")?,
            conversation_id: Self::column(&row, "conversation_id")?,
            messages,
            summary: Self::column(&row, "summary")?,
            updated_at: decode_time(&updated_at)?,
        }))
    }

    async fn append_long_term_batch(&self, batch: &LongTermBatch) -> Result<(), DurableError> {
        let points = serde_json::to_string(&batch.points)
            .map_err(|e| DurableError::PersistFailure(format!("points serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO long_term_batches (id, user_id, points, source_conversation_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.user_id)
        .bind(&points)
        .bind(&batch.source_conversation_id)
        .bind(encode_time(&batch.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| DurableError::PersistFailure(format!("long_term INSERT failed: {e}")))?;

        debug!(id = %batch.id, user_id = %batch.user_id, "Appended long-term batch");
        Ok(())
    }

    async fn long_term_batches(&self, user_id: &str) -> Result<Vec<LongTermBatch>, DurableError> {
        let rows = sqlx::query("SELECT * FROM long_term_batches WHERE user_id = ?1 ORDER BY iid ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DurableError::QueryFailed(format!("long_term lookup: {e}")))?;

        rows.iter().map(Self::row_to_batch).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("SQLite durable store closed");
    }
}
