use anyhow::Result;
use async_trait::async_trait;

use crate::types::AvDetail;

/// Record store behind the lookup pipelines: AV records keyed by code, their
/// preview lists keyed by the same code, and a TTL'd key/value cache.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>>;
    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()>;

    async fn get_av(&self, code: &str) -> Result<Option<AvDetail>>;
    /// Idempotent upsert keyed by `detail.code`.
    async fn put_av(&self, detail: &AvDetail) -> Result<()>;

    async fn list_previews(&self, code: &str) -> Result<Vec<String>>;
    /// Replaces the stored preview list for `code`.
    async fn put_previews(&self, code: &str, urls: &[String]) -> Result<()>;
}
