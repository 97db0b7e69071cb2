//! Event dispatch for the worker.
//!
//! Platform events arrive as `WorkerEvent`s. `ServiceWorker::dispatch`
//! handles one event; `ServiceWorker::spawn` runs a dispatch loop on a
//! channel, one task per event, so slow fetches never block each other.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::connectivity::Connectivity;
use crate::error::WorkerError;
use crate::fetcher::Fetcher;
use crate::http::{Request, Response};
use crate::interceptor::FetchInterceptor;
use crate::lifecycle::{LifecycleController, LifecycleState, WorkerHost};
use crate::manifest::ResourceManifest;
use crate::notify::Notifier;
use crate::route::RouteClassifier;
use crate::store::CacheStorage;
use crate::sync::{BackgroundSync, SyncReport};

/// Buffer size for the event channel
const CHANNEL_BUFFER_SIZE: usize = 64;

#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Ready,
    Fetch(Request),
    PeriodicSync(String),
    /// One-shot tag-based sync, handled like a periodic one
    Sync(String),
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated,
    Ready { periodic_sync: bool },
    Response(Option<Response>),
    Synced(SyncReport),
    /// Sync event carrying somebody else's tag
    Ignored,
}

type Envelope = (WorkerEvent, oneshot::Sender<Result<EventOutcome, WorkerError>>);

/// Collaborators the worker needs from its host.
pub struct WorkerParts {
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub connectivity: Arc<dyn Connectivity>,
    pub notifier: Arc<dyn Notifier>,
    pub host: Arc<dyn WorkerHost>,
}

/// Clone is cheap; all state is shared.
#[derive(Clone)]
pub struct ServiceWorker {
    interceptor: Arc<FetchInterceptor>,
    lifecycle: Arc<LifecycleController>,
    sync: Arc<BackgroundSync>,
    sync_tag: Arc<str>,
}

impl ServiceWorker {
    pub fn new(config: &WorkerConfig, parts: WorkerParts) -> Result<Self, WorkerError> {
        let origin = config.origin_url()?;
        let endpoint = config.document_url()?;
        let classifier = RouteClassifier::new(&config.network_only_patterns)?;

        let interceptor = FetchInterceptor::new(
            classifier,
            parts.storage.clone(),
            parts.fetcher.clone(),
            parts.connectivity,
            config.cache_name.clone(),
        );
        let lifecycle = LifecycleController::new(
            parts.storage.clone(),
            parts.fetcher.clone(),
            parts.host,
            ResourceManifest::new(config.manifest.clone()),
            origin,
            config.cache_name.clone(),
        );
        let sync = BackgroundSync::new(
            parts.storage,
            parts.fetcher,
            parts.notifier,
            config.cache_name.clone(),
            endpoint,
        );

        Ok(Self {
            interceptor: Arc::new(interceptor),
            lifecycle: Arc::new(lifecycle),
            sync: Arc::new(sync),
            sync_tag: Arc::from(config.sync_tag.as_str()),
        })
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        match event {
            WorkerEvent::Install => {
                self.lifecycle.install().await?;
                Ok(EventOutcome::Installed)
            }
            WorkerEvent::Activate => {
                self.lifecycle.activate().await?;
                Ok(EventOutcome::Activated)
            }
            WorkerEvent::Ready => Ok(EventOutcome::Ready {
                periodic_sync: self.lifecycle.ready(),
            }),
            WorkerEvent::Fetch(request) => {
                let response = self.interceptor.intercept(&request).await?;
                Ok(EventOutcome::Response(response))
            }
            WorkerEvent::PeriodicSync(tag) | WorkerEvent::Sync(tag) => {
                if tag != *self.sync_tag {
                    debug!(tag = %tag, "Ignoring sync event with unknown tag");
                    return Ok(EventOutcome::Ignored);
                }
                let report = self.sync.run().await?;
                Ok(EventOutcome::Synced(report))
            }
        }
    }

    /// Start the dispatch loop and return a handle to feed it events.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(self.run(rx));
        WorkerHandle { tx }
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        while let Some((event, reply)) = rx.recv().await {
            let worker = self.clone();
            tokio::spawn(async move {
                let result = worker.dispatch(event).await;
                if let Err(ref e) = result {
                    warn!(error = %e, "Worker event failed");
                }
                // The sender may have stopped waiting; nothing to do then
                let _ = reply.send(result);
            });
        }
        debug!("Worker event loop stopped");
    }
}

#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Envelope>,
}

impl WorkerHandle {
    pub async fn send(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((event, reply_tx))
            .await
            .map_err(|_| WorkerError::Shutdown)?;
        reply_rx.await.map_err(|_| WorkerError::Shutdown)?
    }

    pub async fn fetch(&self, request: Request) -> Result<Option<Response>, WorkerError> {
        match self.send(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Response(response) => Ok(response),
            other => Err(WorkerError::Host(format!("unexpected outcome {:?}", other))),
        }
    }
}
