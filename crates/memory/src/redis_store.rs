//! Redis hot store (for production).
//!
//! One multiplexed connection is opened at startup and shared by every
//! operation. List rebuilds run as a `MULTI`/`EXEC` pipeline so readers never
//! observe a half-written short-term window.

use async_trait::async_trait;
use convmem_core::error::HotStoreError;
use convmem_core::memory::HotStore;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Redis-backed hot store.
///
/// Keys come fully formed from the `KeySpace`; this type adds no prefix.
pub struct RedisHotStore {
    conn: RwLock<Option<MultiplexedConnection>>,
}

fn command_failed(command: &str, e: redis::RedisError) -> HotStoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        HotStoreError::Unavailable(format!("Redis {command} failed: {e}"))
    } else {
        HotStoreError::CommandFailed {
            command: command.into(),
            reason: e.to_string(),
        }
    }
}

impl RedisHotStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the server cannot be reached.
    pub async fn open(redis_url: &str) -> Result<Self, HotStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| HotStoreError::Unavailable(format!("Invalid Redis URL: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HotStoreError::Unavailable(format!("Redis connection failed: {e}")))?;

        let store = Self {
            conn: RwLock::new(Some(conn)),
        };
        store.ping().await?;
        info!("Redis hot store connected");
        Ok(store)
    }

    /// Get a handle on the shared connection.
    async fn connection(&self) -> Result<MultiplexedConnection, HotStoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| HotStoreError::Unavailable("Redis connection is closed".into()))
    }
}

#[async_trait]
impl HotStore for RedisHotStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<u64, HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("LPUSH", e))
    }

    async fn push_back(&self, key: &str, values: &[String]) -> Result<u64, HotStoreError> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(values)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("RPUSH", e))
    }

    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<(), HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| command_failed("LTRIM", e))
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("LRANGE", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| command_failed("SET", e))
    }

    async fn incr(&self, key: &str) -> Result<i64, HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("INCR", e))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let deleted: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("DEL", e))?;
        debug!(requested = keys.len(), deleted, "Deleted hot keys");
        Ok(deleted)
    }

    async fn replace_list(&self, key: &str, values: &[String]) -> Result<(), HotStoreError> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(key).ignore();
        if !values.is_empty() {
            pipe.cmd("RPUSH").arg(key).arg(values).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| command_failed("MULTI", e))
    }

    async fn ping(&self) -> Result<(), HotStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| command_failed("PING", e))
    }

    async fn close(&self) {
        self.conn.write().await.take();
        debug!("Redis hot store closed");
    }
}
