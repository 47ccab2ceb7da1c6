//! PostgreSQL durable store.
//!
//! Same three collections as the SQLite store, with native `TIMESTAMPTZ`
//! columns and `JSONB` for the snapshot messages and long-term points.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag:
//!
//! ```toml
//! convmem-memory = { workspace = true, features = ["postgres"] }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convmem_core::error::DurableError;
use convmem_core::memory::{
    ChatLogEntry, ChatLogPage, DurableStore, LongTermBatch, ShortTermSnapshot,
};
use convmem_core::message::Role;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::str::FromStr;
use tracing::{debug, info};

/// PostgreSQL durable store.
pub struct PostgresDurableStore {
    pool: PgPool,
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DurableError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DurableError::QueryFailed(format!("{name} column: {e}")))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str, name: &str) -> Result<T, DurableError> {
    serde_json::from_str(raw).map_err(|e| DurableError::QueryFailed(format!("{name} column: {e}")))
}

fn row_to_entry(row: &PgRow) -> Result<ChatLogEntry, DurableError> {
    let role: String = column(row, "role")?;
    Ok(ChatLogEntry {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        conversation_id: column(row, "conversation_id")?,
        role: Role::from_str(&role).map_err(DurableError::QueryFailed)?,
        content: column(row, "content")?,
        timestamp: column::<DateTime<Utc>>(row, "timestamp")?,
    })
}

const CHAT_LOG_COLUMNS: &str = "id, user_id, conversation_id, role, content, timestamp";

impl PostgresDurableStore {
    /// Connect to PostgreSQL and run the schema migration.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DurableError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| DurableError::Connection(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to PostgreSQL for durable store");
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create from an existing connection pool. Call [`migrate`](Self::migrate) before use.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the schema migration. Idempotent.
    pub async fn migrate(&self) -> Result<(), DurableError> {
        let migration_sql = include_str!("../migrations/001_create_memory_tiers.sql");

        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DurableError::MigrationFailed(format!("Migration failed: {e}")))?;

        info!("Durable schema migration complete");
        Ok(())
    }
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> Result<(), DurableError> {
        sqlx::query(
            r#"
            INSERT INTO chat_log (id, user_id, conversation_id, role, content, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.conversation_id)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(entry.timestamp)
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
        let sql = format!(
            "SELECT {CHAT_LOG_COLUMNS} FROM chat_log WHERE user_id = $1 \
             ORDER BY timestamp DESC, iid DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(skip).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DurableError::QueryFailed(format!("chat_log page: {e}")))?;

        let count_row = sqlx::query("SELECT COUNT(*) AS total FROM chat_log WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DurableError::QueryFailed(format!("chat_log count: {e}")))?;
        let total: i64 = column(&count_row, "total")?;

        Ok(ChatLogPage {
            entries: rows.iter().map(row_to_entry).collect::<Result<_, _>>()?,
            total: total as u64,
        })
    }

    async fn conversation_log(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLogEntry>, DurableError> {
        let sql = format!(
            "SELECT {CHAT_LOG_COLUMNS} FROM chat_log \
             WHERE user_id = $1 AND conversation_id = $2 ORDER BY iid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DurableError::QueryFailed(format!("conversation log: {e}")))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn upsert_snapshot(&self, snapshot: &ShortTermSnapshot) -> Result<(), DurableError> {
        let messages = serde_json::to_string(&snapshot.messages)
            .map_err(|e| DurableError::PersistFailure(format!("messages serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO short_term_snapshots (user_id, conversation_id, messages, summary, updated_at)
            VALUES ($1, $2, $3::jsonb, $4, $5)
            ON CONFLICT (user_id, conversation_id) DO UPDATE SET
                messages = EXCLUDED.messages,
                summary = EXCLUDED.summary,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&snapshot.user_id)
        .bind(&snapshot.conversation_id)
        .bind(&messages)
        .bind(&snapshot.summary)
        .bind(snapshot.updated_at)
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
            r#"
            SELECT user_id, conversation_id, messages::text AS messages, summary, updated_at
            FROM short_term_snapshots
            WHERE user_id = $1 AND conversation_id = $2
            "#,
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DurableError::QueryFailed(format!("snapshot lookup: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let messages: String = column(&row, "messages")?;

        Ok(Some(ShortTermSnapshot {
            user_id: column(&row, "user_id")?,
            conversation_id: column(&row, "conversation_id")?,
            messages: decode_json(&messages, "messages")?,
            summary: column(&row, "summary")?,
            updated_at: column(&row, "updated_at")?,
        }))
    }

    async fn append_long_term_batch(&self, batch: &LongTermBatch) -> Result<(), DurableError> {
        let points = serde_json::to_string(&batch.points)
            .map_err(|e| DurableError::PersistFailure(format!("points serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO long_term_batches (id, user_id, points, source_conversation_id, created_at)
            VALUES ($1, $2, $3::jsonb, $4, $5)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.user_id)
        .bind(&points)
        .bind(&batch.source_conversation_id)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DurableError::PersistFailure(format!("long_term INSERT failed: {e}")))?;

        debug!(id = %batch.id, user_id = %batch.user_id, "Appended long-term batch");
        Ok(())
    }

    async fn long_term_batches(&self, user_id: &str) -> Result<Vec<LongTermBatch>, DurableError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, points::text AS points, source_conversation_id, created_at
            FROM long_term_batches
            WHERE user_id = $1
            ORDER BY iid ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DurableError::QueryFailed(format!("long_term lookup: {e}")))?;

        rows.iter()
            .map(|row| {
                let points: String = column(row, "points")?;
                Ok(LongTermBatch {
                    id: column(row, "id")?,
                    user_id: column(row, "user_id")?,
                    points: decode_json(&points, "points")?,
                    source_conversation_id: column(row, "source_conversation_id")?,
                    created_at: column(row, "created_at")?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("PostgreSQL durable store closed");
    }
}
