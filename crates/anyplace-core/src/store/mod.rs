//! Named response caches for offline access.
//!
//! A `CacheStorage` hands out named `Cache`s; each maps a `RequestKey` to
//! the last stored `CachedResponse`. One cache exists per deployed worker
//! version (e.g. `Anyplace-V1`). Entries are only ever overwritten; nothing
//! is evicted while a version is live.
//!
//! Backends:
//! - `MemoryCacheStorage`: process-local, used by tests and embedders
//! - `DiskCacheStorage`: one directory per cache under the user cache dir

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::http::{RequestKey, ResponseMeta};

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// A stored response: everything needed to re-serve it as a live response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub meta: ResponseMeta,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(meta: ResponseMeta, body: Vec<u8>) -> Self {
        Self {
            meta,
            body,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", (minutes + 30) / 60)
        } else {
            format!("{}d ago", (minutes + 720) / 1440)
        }
    }
}

/// Metadata line at the head of an on-disk entry file; the body follows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryRecord {
    pub key: RequestKey,
    pub meta: ResponseMeta,
    pub cached_at: DateTime<Utc>,
}

#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError>;

    /// Store `response` under `key`, replacing any previous snapshot.
    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StoreError>;

    /// Store every entry or none of them.
    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError>;
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the cache called `name`, creating it when missing.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError>;

    async fn names(&self) -> Result<Vec<String>, StoreError>;

    /// Returns false when no cache of that name existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// Cache names double as directory names, so keep them to a safe alphabet.
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Delete every cache except `keep`. Returns the names removed.
pub async fn prune_except(storage: &dyn CacheStorage, keep: &str) -> Result<Vec<String>, StoreError> {
    let mut removed = Vec::new();
    for name in storage.names().await? {
        if name != keep && storage.delete(&name).await? {
            info!(cache = %name, "Deleted orphaned cache");
            removed.push(name);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age_display_just_now() {
        let cached = CachedResponse::new(ResponseMeta::new(200), Vec::new());
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_age_display_rounds() {
        let mut cached = CachedResponse::new(ResponseMeta::new(200), Vec::new());
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::minutes(25);
        assert_eq!(cached.age_display(), "25m ago");

        cached.cached_at = Utc::now() - Duration::hours(30);
        assert_eq!(cached.age_display(), "1d ago");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Anyplace-V1").is_ok());
        assert!(validate_name("anyplace_v2.1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[tokio::test]
    async fn test_prune_except_keeps_current_version() {
        let storage = MemoryCacheStorage::new();
        storage.open("Anyplace-V0").await.unwrap();
        storage.open("Anyplace-V1").await.unwrap();

        let removed = prune_except(&storage, "Anyplace-V1").await.unwrap();
        assert_eq!(removed, vec!["Anyplace-V0".to_string()]);
        assert_eq!(storage.names().await.unwrap(), vec!["Anyplace-V1".to_string()]);
    }
}
