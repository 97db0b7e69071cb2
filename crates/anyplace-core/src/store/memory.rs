use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_name, Cache, CacheStorage, CachedResponse};
use crate::error::StoreError;
use crate::http::RequestKey;

/// Process-local cache storage. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        validate_name(name)?;
        let mut caches = self.caches.write().await;
        let cache: Arc<dyn Cache> = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)))
            .clone();
        Ok(cache)
    }

    async fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }
}

pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<RequestKey, CachedResponse>>,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StoreError> {
        self.entries.write().await.insert(key, response);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<(), StoreError> {
        // Single write lock: readers see all of the batch or none of it
        let mut map = self.entries.write().await;
        map.extend(entries);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        let mut keys: Vec<RequestKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseMeta;
    use reqwest::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::for_url(&Url::parse("http://localhost:8080/").unwrap().join(path).unwrap())
    }

    fn snapshot(body: &str) -> CachedResponse {
        CachedResponse::new(ResponseMeta::new(200), body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_open_returns_same_cache() {
        let storage = MemoryCacheStorage::new();
        let first = storage.open("Anyplace-V1").await.unwrap();
        first.put(key("/a.js"), snapshot("a")).await.unwrap();

        let second = storage.open("Anyplace-V1").await.unwrap();
        assert_eq!(second.get(&key("/a.js")).await.unwrap().unwrap().body, b"a");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        cache.put(key("/index.html"), snapshot("old")).await.unwrap();
        cache.put(key("/index.html"), snapshot("new")).await.unwrap();

        let stored = cache.get(&key("/index.html")).await.unwrap().unwrap();
        assert_eq!(stored.body, b"new");
        assert_eq!(cache.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_caches_are_isolated_by_name() {
        let storage = MemoryCacheStorage::new();
        let v1 = storage.open("Anyplace-V1").await.unwrap();
        let v2 = storage.open("Anyplace-V2").await.unwrap();
        v1.put(key("/a.js"), snapshot("a")).await.unwrap();

        assert!(v2.get(&key("/a.js")).await.unwrap().is_none());
        assert_eq!(storage.names().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_put_all_and_keys() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        cache
            .put_all(vec![(key("/b.css"), snapshot("b")), (key("/a.js"), snapshot("a"))])
            .await
            .unwrap();

        let keys = cache.keys().await.unwrap();
        assert_eq!(keys, vec![key("/a.js"), key("/b.css")]);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_name() {
        let storage = MemoryCacheStorage::new();
        assert!(matches!(
            storage.open("../escape").await,
            Err(StoreError::InvalidName(_))
        ));
    }
}
