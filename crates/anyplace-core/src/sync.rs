//! Periodic background sync of the timeline document.
//!
//! Each run compares the cached document with a fresh copy by the length of
//! their `value` arrays and raises a notification when the rule fires. The
//! fresh copy always replaces the cached one.

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::fetcher::{CredentialsMode, Fetcher};
use crate::http::{Request, RequestKey, Response};
use crate::notify::{Notification, Notifier};
use crate::store::CacheStorage;

/// Only the length of `value` matters to the comparison; a `value` that is
/// not an array counts as missing.
#[derive(Debug, Deserialize)]
struct DocumentEnvelope {
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub cached_len: Option<usize>,
    pub live_len: Option<usize>,
    pub notified: bool,
}

impl SyncReport {
    /// The notification rule: both documents present with equal lengths.
    ///
    /// Equal lengths usually mean nothing was added; the rule is kept as
    /// the app shipped it.
    pub fn should_notify(cached_len: Option<usize>, live_len: Option<usize>) -> bool {
        matches!((cached_len, live_len), (Some(cached), Some(live)) if cached == live)
    }
}

pub struct BackgroundSync {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    cache_name: String,
    endpoint: Url,
}

impl BackgroundSync {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        cache_name: impl Into<String>,
        endpoint: Url,
    ) -> Self {
        Self {
            storage,
            fetcher,
            notifier,
            cache_name: cache_name.into(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Run one sync. Any failure aborts the run; nothing is retried here.
    pub async fn run(&self) -> Result<SyncReport, WorkerError> {
        info!(endpoint = %self.endpoint, "Background sync triggered");
        let cache = self.storage.open(&self.cache_name).await?;
        let key = RequestKey::for_url(&self.endpoint);

        let cached_len = match cache.get(&key).await? {
            Some(cached) if cached.meta.is_ok() => {
                Self::value_len(Response::from_cached(&cached)).await?
            }
            _ => None,
        };

        let request = Request::new(reqwest::Method::GET, self.endpoint.clone());
        let fresh = self
            .fetcher
            .fetch(&request, CredentialsMode::SameOrigin)
            .await?;
        let (live, stored) = fresh.duplicate().await?;
        cache.put(key, stored.into_snapshot().await?).await?;

        let live_len = if live.is_ok() {
            Self::value_len(live).await?
        } else {
            debug!(status = live.status(), "Sync document fetch was not OK");
            None
        };

        let notified = SyncReport::should_notify(cached_len, live_len);
        if notified {
            let entries = live_len.unwrap_or_default();
            self.notifier
                .notify(&Notification::new_data(entries))
                .await
                .map_err(|e| WorkerError::Notify(format!("{:#}", e)))?;
        }

        info!(cached_len = ?cached_len, live_len = ?live_len, notified, "Background sync finished");
        Ok(SyncReport {
            cached_len,
            live_len,
            notified,
        })
    }

    async fn value_len(response: Response) -> Result<Option<usize>, WorkerError> {
        let envelope: DocumentEnvelope = response.json().await??;
        Ok(envelope
            .value
            .as_ref()
            .and_then(serde_json::Value::as_array)
            .map(Vec::len))
    }
}
