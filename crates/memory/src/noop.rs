//! No-op hot store. Disables the volatile tier entirely.
//!
//! Reads come back empty, writes vanish and the counter stays at zero, so
//! every ingestion is still recorded durably but no escalation ever fires.

use async_trait::async_trait;
use convmem_core::error::HotStoreError;
use convmem_core::memory::HotStore;

/// A hot store that stores nothing.
pub struct NoopHotStore;

#[async_trait]
impl HotStore for NoopHotStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn push_front(&self, _key: &str, _value: &str) -> Result<u64, HotStoreError> {
        Ok(0)
    }

    async fn push_back(&self, _key: &str, _values: &[String]) -> Result<u64, HotStoreError> {
        Ok(0)
    }

    async fn trim(&self, _key: &str, _start: i64, _stop: i64) -> Result<(), HotStoreError> {
        Ok(())
    }

    async fn range(
        &self,
        _key: &str,
        _start: i64,
        _stop: i64,
    ) -> Result<Vec<String>, HotStoreError> {
        Ok(Vec::new())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, HotStoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), HotStoreError> {
        Ok(())
    }

    async fn incr(&self, _key: &str) -> Result<i64, HotStoreError> {
        Ok(0)
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, HotStoreError> {
        Ok(0)
    }
}
