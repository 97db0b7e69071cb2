//! File-backed cache storage.
//!
//! Layout: `<root>/<cache name>/<sha256(key)>.entry`. Each entry file is a
//! single line of JSON metadata, a newline, then the raw body, so metadata
//! and body are always replaced together. Every write goes to its own
//! scratch file and is renamed into place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::{validate_name, Cache, CacheStorage, CachedResponse, EntryRecord};
use crate::error::StoreError;
use crate::http::RequestKey;

const ENTRY_EXT: &str = "entry";
const SCRATCH_EXT: &str = "tmp";

/// Sequence for scratch file names, shared by every cache in the process.
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).await?;
        let cache: Arc<dyn Cache> = Arc::new(DiskCache {
            name: name.to_string(),
            dir,
        });
        Ok(cache)
    }

    async fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        if !fs::try_exists(&dir).await? {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).await?;
        Ok(true)
    }
}

/// An entry written to its scratch file, waiting to be renamed into place.
struct Staged {
    stem: String,
    scratch: PathBuf,
    target: PathBuf,
}

/// A committed batch entry and the previous file it replaced, if any.
struct Committed {
    target: PathBuf,
    backup: Option<PathBuf>,
}

pub struct DiskCache {
    name: String,
    dir: PathBuf,
}

impl DiskCache {
    fn file_stem(key: &RequestKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::file_stem(key), ENTRY_EXT))
    }

    /// A file name no other writer in this or another process will pick.
    fn scratch_path(&self, stem: &str) -> PathBuf {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{}-{}.{}",
            stem,
            std::process::id(),
            seq,
            SCRATCH_EXT
        ))
    }

    fn encode(key: &RequestKey, response: &CachedResponse) -> Result<Vec<u8>, StoreError> {
        let record = EntryRecord {
            key: key.clone(),
            meta: response.meta.clone(),
            cached_at: response.cached_at,
        };
        // Compact JSON never contains a raw newline
        let mut contents = serde_json::to_vec(&record)?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.body);
        Ok(contents)
    }

    fn decode(path: &Path, mut contents: Vec<u8>) -> Result<(EntryRecord, Vec<u8>), StoreError> {
        let split = contents
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StoreError::Malformed(path.display().to_string()))?;
        let record = serde_json::from_slice(&contents[..split])?;
        let body = contents.split_off(split + 1);
        Ok((record, body))
    }

    /// Read just the metadata line of an entry file.
    async fn read_record(path: &Path) -> Result<EntryRecord, StoreError> {
        let file = fs::File::open(path).await?;
        let mut line = Vec::new();
        BufReader::new(file).read_until(b'\n', &mut line).await?;
        if line.pop() != Some(b'\n') {
            return Err(StoreError::Malformed(path.display().to_string()));
        }
        Ok(serde_json::from_slice(&line)?)
    }

    async fn stage(&self, key: &RequestKey, response: &CachedResponse) -> Result<Staged, StoreError> {
        let contents = Self::encode(key, response)?;
        let stem = Self::file_stem(key);
        let scratch = self.scratch_path(&stem);
        if let Err(e) = fs::write(&scratch, contents).await {
            remove_quietly(&scratch).await;
            return Err(e.into());
        }
        Ok(Staged {
            stem,
            scratch,
            target: self.entry_path(key),
        })
    }

    /// Rename a staged entry into place, keeping a hard link to the file it
    /// replaces so a failed batch can put it back.
    async fn commit_with_backup(&self, staged: &Staged) -> Result<Committed, StoreError> {
        let backup = match fs::symlink_metadata(&staged.target).await {
            Ok(_) => {
                let backup = self.scratch_path(&staged.stem);
                if fs::hard_link(&staged.target, &backup).await.is_err() {
                    fs::copy(&staged.target, &backup).await?;
                }
                Some(backup)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = fs::rename(&staged.scratch, &staged.target).await {
            if let Some(backup) = &backup {
                remove_quietly(backup).await;
            }
            return Err(e.into());
        }
        Ok(Committed {
            target: staged.target.clone(),
            backup,
        })
    }

    async fn roll_back(&self, committed: Vec<Committed>) {
        for entry in committed.into_iter().rev() {
            let restored = match &entry.backup {
                Some(backup) => fs::rename(backup, &entry.target).await,
                None => fs::remove_file(&entry.target).await,
            };
            if let Err(e) = restored {
                warn!(cache = %self.name, path = %entry.target.display(), error = %e, "Failed to roll back cache entry");
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch cache file");
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError> {
        let path = self.entry_path(key);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (record, body) = Self::decode(&path, contents)?;
        if record.key != *key {
            // Hash collision or a file copied from elsewhere
            debug!(cache = %self.name, key = %key, "Cache entry key mismatch");
            return Ok(None);
        }
        Ok(Some(CachedResponse {
            meta: record.meta,
            body,
            cached_at: record.cached_at,
        }))
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StoreError> {
        let staged = self.stage(&key, &response).await?;
        if let Err(e) = fs::rename(&staged.scratch, &staged.target).await {
            remove_quietly(&staged.scratch).await;
            return Err(e.into());
        }
        debug!(cache = %self.name, key = %key, bytes = response.body.len(), "Stored cache entry");
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<(), StoreError> {
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in &entries {
            match self.stage(key, response).await {
                Ok(entry) => staged.push(entry),
                Err(e) => {
                    for entry in &staged {
                        remove_quietly(&entry.scratch).await;
                    }
                    return Err(e);
                }
            }
        }

        let mut committed = Vec::with_capacity(staged.len());
        for (index, entry) in staged.iter().enumerate() {
            match self.commit_with_backup(entry).await {
                Ok(done) => committed.push(done),
                Err(e) => {
                    warn!(cache = %self.name, error = %e, "Cache batch failed, rolling back");
                    self.roll_back(committed).await;
                    for pending in &staged[index..] {
                        remove_quietly(&pending.scratch).await;
                    }
                    return Err(e);
                }
            }
        }
        for done in committed {
            if let Some(backup) = done.backup {
                remove_quietly(&backup).await;
            }
        }
        debug!(cache = %self.name, count = entries.len(), "Stored cache batch");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT)
                || !entry.file_type().await?.is_file()
            {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => keys.push(record.key),
                // Replaced or removed since the directory was listed
                Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseMeta;
    use reqwest::Url;
    use tempfile::TempDir;

    fn key(path: &str) -> RequestKey {
        RequestKey::for_url(&Url::parse("http://localhost:8080/").unwrap().join(path).unwrap())
    }

    fn snapshot(body: &[u8]) -> CachedResponse {
        let mut meta = ResponseMeta::new(200);
        meta.status_text = "OK".to_string();
        meta.headers
            .push(("content-type".to_string(), "application/octet-stream".to_string()));
        CachedResponse::new(meta, body.to_vec())
    }

    fn scratch_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(SCRATCH_EXT))
            .collect()
    }

    #[tokio::test]
    async fn test_put_then_get_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        // Body bytes include newlines
        let stored = snapshot(&[0, 159, b'\n', 146, 150, b'\n']);
        cache.put(key("/leaflet/images/layers.png"), stored.clone()).await.unwrap();

        let reopened = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = reopened.open("Anyplace-V1").await.unwrap();
        let loaded = cache.get(&key("/leaflet/images/layers.png")).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        assert!(cache.get(&key("/nothing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_entry_is_malformed() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        let path = dir
            .path()
            .join("Anyplace-V1")
            .join(format!("{}.{}", DiskCache::file_stem(&key("/a.js")), ENTRY_EXT));
        std::fs::write(&path, b"{\"key\":").unwrap();

        assert!(matches!(
            cache.get(&key("/a.js")).await,
            Err(StoreError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_keys_lists_once() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        cache.put(key("/index.html"), snapshot(b"old")).await.unwrap();
        cache.put(key("/index.html"), snapshot(b"new")).await.unwrap();

        assert_eq!(cache.get(&key("/index.html")).await.unwrap().unwrap().body, b"new");
        assert_eq!(cache.keys().await.unwrap(), vec![key("/index.html")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_one_key_never_tear() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        let body_for = |i: u8| vec![i; 4096 * (usize::from(i) + 1)];

        for _ in 0..50 {
            let writers: Vec<_> = (0..4u8)
                .map(|i| {
                    let cache = cache.clone();
                    let body = body_for(i);
                    tokio::spawn(async move {
                        let meta = ResponseMeta::new(200 + u16::from(i));
                        cache.put(key("/index.html"), CachedResponse::new(meta, body)).await
                    })
                })
                .collect();
            let reader = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&key("/index.html")).await })
            };

            for writer in writers {
                writer.await.unwrap().unwrap();
            }
            let mut seen = vec![cache.get(&key("/index.html")).await.unwrap().unwrap()];
            seen.extend(reader.await.unwrap().unwrap());
            for entry in seen {
                let i = u8::try_from(entry.meta.status - 200).unwrap();
                assert_eq!(entry.body, body_for(i), "body does not match status {}", entry.meta.status);
            }
        }

        assert_eq!(cache.keys().await.unwrap(), vec![key("/index.html")]);
        assert!(scratch_files(&dir.path().join("Anyplace-V1")).is_empty());
    }

    #[tokio::test]
    async fn test_put_all_commits_every_entry() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        cache
            .put_all(vec![(key("/a.js"), snapshot(b"a")), (key("/b.css"), snapshot(b"b"))])
            .await
            .unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec![key("/a.js"), key("/b.css")]);
        assert!(scratch_files(&dir.path().join("Anyplace-V1")).is_empty());
    }

    #[tokio::test]
    async fn test_put_all_failure_restores_previous_entries() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("Anyplace-V1").await.unwrap();
        cache.put(key("/a.js"), snapshot(b"old a")).await.unwrap();

        // A directory sitting on the last entry's path makes its commit fail
        let cache_dir = dir.path().join("Anyplace-V1");
        let blocked = cache_dir.join(format!("{}.{}", DiskCache::file_stem(&key("/b.css")), ENTRY_EXT));
        std::fs::create_dir(&blocked).unwrap();

        let result = cache
            .put_all(vec![
                (key("/a.js"), snapshot(b"new a")),
                (key("/c.png"), snapshot(b"c")),
                (key("/b.css"), snapshot(b"b")),
            ])
            .await;
        assert!(result.is_err());

        assert_eq!(cache.get(&key("/a.js")).await.unwrap().unwrap().body, b"old a");
        assert!(cache.get(&key("/c.png")).await.unwrap().is_none());
        assert_eq!(cache.keys().await.unwrap(), vec![key("/a.js")]);
        assert!(scratch_files(&cache_dir).is_empty());

        std::fs::remove_dir(&blocked).unwrap();
    }

    #[tokio::test]
    async fn test_names_and_delete() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage.open("Anyplace-V0").await.unwrap();
        storage.open("Anyplace-V1").await.unwrap();

        assert_eq!(
            storage.names().await.unwrap(),
            vec!["Anyplace-V0".to_string(), "Anyplace-V1".to_string()]
        );
        assert!(storage.delete("Anyplace-V0").await.unwrap());
        assert!(!storage.delete("Anyplace-V0").await.unwrap());
        assert_eq!(storage.names().await.unwrap(), vec!["Anyplace-V1".to_string()]);
    }
}
