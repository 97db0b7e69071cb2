//! Core library for the Anyplace offline worker.
//!
//! Every request the app makes goes through [`FetchInterceptor`]: live map
//! traffic is passed straight to the network, everything else is served
//! stale-while-revalidate from a named cache. [`LifecycleController`] seeds
//! that cache at install and takes over open pages at activation;
//! [`BackgroundSync`] refreshes the timeline document on periodic sync and
//! notifies the user. [`ServiceWorker`] ties them together behind a single
//! event dispatcher.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod manifest;
pub mod models;
pub mod notify;
pub mod policy;
pub mod route;
pub mod store;
pub mod sync;
pub mod worker;

pub use config::WorkerConfig;
pub use connectivity::{Connectivity, NetworkStatus};
pub use error::{NetworkError, StoreError, WorkerError};
pub use fetcher::{CredentialsMode, Fetcher, HttpFetcher};
pub use http::{Body, Request, RequestKey, Response, ResponseMeta};
pub use interceptor::FetchInterceptor;
pub use lifecycle::{LifecycleController, LifecycleState, WorkerHost};
pub use manifest::ResourceManifest;
pub use models::{TimelineDocument, TimelineEntry, TimelineItem};
pub use notify::{Notification, NotificationAction, Notifier};
pub use route::{RouteClassifier, RoutePolicy};
pub use store::{Cache, CacheStorage, CachedResponse, DiskCacheStorage, MemoryCacheStorage};
pub use sync::{BackgroundSync, SyncReport};
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent, WorkerHandle, WorkerParts};
