#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyplace_core::{
    Cache, CacheStorage, CredentialsMode, Fetcher, MemoryCacheStorage, NetworkError,
    NetworkStatus, Notification, Notifier, Request, Response, ResponseMeta, ServiceWorker,
    StoreError, WorkerConfig, WorkerHost, WorkerParts,
};
use async_trait::async_trait;

pub const ORIGIN: &str = "http://localhost:8080/";
pub const ENDPOINT: &str = "https://docs.example.org/api/getGoogleDoc?docID=abc";

/// Replies from a script keyed by URL; unscripted URLs fail like a dead network.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn reply(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.into()));
    }

    pub fn fail(&self, url: &str) {
        self.replies.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &Request,
        _credentials: CredentialsMode,
    ) -> Result<Response, NetworkError> {
        let url = request.url().to_string();
        self.calls.lock().unwrap().push(url.clone());
        let reply = self.replies.lock().unwrap().get(&url).cloned();
        match reply {
            Some((status, body)) => Ok(Response::new(ResponseMeta::new(status), body)),
            None => Err(NetworkError::Offline),
        }
    }
}

/// Memory storage that counts how often a cache is opened.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryCacheStorage,
    opens: AtomicUsize,
}

impl CountingStorage {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(name).await
    }

    async fn names(&self) -> Result<Vec<String>, StoreError> {
        self.inner.names().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete(name).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHost {
    pub skipped_waiting: AtomicUsize,
    pub claimed: AtomicUsize,
    pub periodic_sync: bool,
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn skip_waiting(&self) -> anyhow::Result<()> {
        self.skipped_waiting.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> anyhow::Result<()> {
        self.claimed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_periodic_sync(&self) -> bool {
        self.periodic_sync
    }
}

pub struct Harness {
    pub worker: ServiceWorker,
    pub storage: Arc<CountingStorage>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub network: Arc<NetworkStatus>,
    pub notifier: Arc<RecordingNotifier>,
    pub host: Arc<RecordingHost>,
    pub config: WorkerConfig,
}

impl Harness {
    pub fn new(manifest: &[&str]) -> Self {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            document_endpoint: ENDPOINT.to_string(),
            manifest: manifest.iter().map(|s| s.to_string()).collect(),
            ..WorkerConfig::default()
        };
        let storage = Arc::new(CountingStorage::default());
        let fetcher = Arc::new(ScriptedFetcher::default());
        let network = Arc::new(NetworkStatus::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let host = Arc::new(RecordingHost {
            periodic_sync: true,
            ..RecordingHost::default()
        });
        let worker = ServiceWorker::new(
            &config,
            WorkerParts {
                storage: storage.clone(),
                fetcher: fetcher.clone(),
                connectivity: network.clone(),
                notifier: notifier.clone(),
                host: host.clone(),
            },
        )
        .unwrap();
        Self {
            worker,
            storage,
            fetcher,
            network,
            notifier,
            host,
            config,
        }
    }

    pub async fn cache(&self) -> Arc<dyn Cache> {
        self.storage.inner.open(&self.config.cache_name).await.unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        reqwest::Url::parse(ORIGIN).unwrap().join(path).unwrap().to_string()
    }
}
