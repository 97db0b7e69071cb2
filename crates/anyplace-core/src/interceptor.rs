use std::sync::Arc;

use tracing::debug;

use crate::connectivity::Connectivity;
use crate::error::WorkerError;
use crate::fetcher::Fetcher;
use crate::http::{Request, Response};
use crate::policy;
use crate::route::{RouteClassifier, RoutePolicy};
use crate::store::CacheStorage;

/// Decides what the page receives for every request it makes.
pub struct FetchInterceptor {
    classifier: RouteClassifier,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    connectivity: Arc<dyn Connectivity>,
    cache_name: String,
}

impl FetchInterceptor {
    pub fn new(
        classifier: RouteClassifier,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        connectivity: Arc<dyn Connectivity>,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            storage,
            fetcher,
            connectivity,
            cache_name: cache_name.into(),
        }
    }

    /// `Ok(None)` is a cache miss with the network unavailable. Errors are
    /// failed network-only fetches or cache store failures.
    pub async fn intercept(&self, request: &Request) -> Result<Option<Response>, WorkerError> {
        let route = self.classifier.classify(request.url());
        debug!(url = %request.url(), ?route, "Intercepted request");

        match route {
            RoutePolicy::NetworkOnly => policy::network_only(self.fetcher.as_ref(), request)
                .await
                .map(Some),
            RoutePolicy::StaleWhileRevalidate => {
                policy::stale_while_revalidate(
                    self.storage.as_ref(),
                    &self.cache_name,
                    self.fetcher.as_ref(),
                    self.connectivity.as_ref(),
                    request,
                )
                .await
            }
        }
    }
}
