//! Install, activate and ready handling.
//!
//! The host owns the real worker state machine; the controller only reacts
//! to its events and remembers the last transition it drove.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::fetcher::{CredentialsMode, Fetcher};
use crate::http::{Request, RequestKey};
use crate::manifest::ResourceManifest;
use crate::store::{CacheStorage, CachedResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Waiting,
    Activating,
    Activated,
    Redundant,
}

/// Calls back into the platform hosting the worker.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Replace any waiting worker now instead of when all pages close.
    async fn skip_waiting(&self) -> anyhow::Result<()>;

    /// Take control of pages opened under a previous worker version.
    async fn claim_clients(&self) -> anyhow::Result<()>;

    fn supports_periodic_sync(&self) -> bool;
}

pub struct LifecycleController {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn WorkerHost>,
    manifest: ResourceManifest,
    origin: Url,
    cache_name: String,
    state: Mutex<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn WorkerHost>,
        manifest: ResourceManifest,
        origin: Url,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            host,
            manifest,
            origin,
            cache_name: cache_name.into(),
            state: Mutex::new(LifecycleState::Parsed),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        debug!(?state, "Lifecycle transition");
    }

    /// Seed the cache with every manifest entry, then skip waiting.
    ///
    /// All-or-nothing: if any entry cannot be fetched with an OK status,
    /// nothing is written and the worker becomes redundant.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.set_state(LifecycleState::Installing);
        match self.seed().await {
            Ok(count) => {
                info!(cache = %self.cache_name, count, "Cache seeded");
                self.set_state(LifecycleState::Waiting);
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant);
                return Err(e);
            }
        }

        self.host
            .skip_waiting()
            .await
            .map_err(|e| WorkerError::Host(format!("{:#}", e)))?;
        self.set_state(LifecycleState::Activating);
        Ok(())
    }

    async fn seed(&self) -> Result<usize, WorkerError> {
        let cache = self.storage.open(&self.cache_name).await?;
        let requests = self.manifest.requests(&self.origin)?;
        let entries = try_join_all(requests.iter().map(|r| self.fetch_asset(r))).await?;
        let count = entries.len();
        cache.put_all(entries).await?;
        Ok(count)
    }

    async fn fetch_asset(
        &self,
        request: &Request,
    ) -> Result<(RequestKey, CachedResponse), WorkerError> {
        let resource = request.url().to_string();
        let response = self
            .fetcher
            .fetch(request, CredentialsMode::SameOrigin)
            .await
            .map_err(|e| WorkerError::seeding(&resource, e))?;
        if !response.is_ok() {
            return Err(WorkerError::seeding(
                &resource,
                format!("HTTP status {}", response.status()),
            ));
        }
        // Nothing else reads a seeded response, so it goes straight to the store
        let snapshot = response
            .into_snapshot()
            .await
            .map_err(|e| WorkerError::seeding(&resource, e))?;
        Ok((request.key(), snapshot))
    }

    /// Control every open page right away.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.host
            .claim_clients()
            .await
            .map_err(|e| WorkerError::Host(format!("{:#}", e)))?;
        self.set_state(LifecycleState::Activated);
        info!(cache = %self.cache_name, "Worker activated, clients claimed");
        Ok(())
    }

    /// Diagnostic probe for periodic background sync support.
    pub fn ready(&self) -> bool {
        let supported = self.host.supports_periodic_sync();
        if supported {
            info!("Periodic sync is supported");
        } else {
            info!("Periodic sync is not supported");
        }
        supported
    }
}
