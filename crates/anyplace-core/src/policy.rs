//! Per-route caching policies.

use reqwest::Method;
use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::error::WorkerError;
use crate::fetcher::{CredentialsMode, Fetcher};
use crate::http::{Request, Response};
use crate::store::CacheStorage;

/// Live fetch, verbatim result, no cache access. Failures propagate:
/// stale live data is worse than none.
pub async fn network_only(fetcher: &dyn Fetcher, request: &Request) -> Result<Response, WorkerError> {
    let response = fetcher.fetch(request, CredentialsMode::SameOrigin).await?;
    Ok(response)
}

/// Refresh the cached copy when online and serve the fresh response;
/// serve the cached copy when offline or when the network fails.
///
/// `Ok(None)` means nothing is cached and the network could not help.
pub async fn stale_while_revalidate(
    storage: &dyn CacheStorage,
    cache_name: &str,
    fetcher: &dyn Fetcher,
    connectivity: &dyn Connectivity,
    request: &Request,
) -> Result<Option<Response>, WorkerError> {
    let cache = storage.open(cache_name).await?;
    let key = request.key();
    let cached_version = cache.get(&key).await?;

    if !connectivity.is_online() {
        debug!(key = %key, hit = cached_version.is_some(), "Offline, serving from cache");
        return Ok(cached_version.as_ref().map(Response::from_cached));
    }

    let fresh = match fetcher.fetch(request, CredentialsMode::SameOrigin).await {
        Ok(fresh) => fresh,
        Err(e) => {
            debug!(key = %key, error = %e, "Fetch failed, serving from cache");
            return Ok(cached_version.as_ref().map(Response::from_cached));
        }
    };

    let (live, stored) = match fresh.duplicate().await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(key = %key, error = %e, "Body read failed, serving from cache");
            return Ok(cached_version.as_ref().map(Response::from_cached));
        }
    };

    // Only GET responses are cacheable
    if *request.method() == Method::GET {
        let snapshot = stored.into_snapshot().await?;
        if let Err(e) = cache.put(key.clone(), snapshot).await {
            warn!(key = %key, error = %e, "Failed to update cache");
        }
    }

    Ok(Some(live))
}
