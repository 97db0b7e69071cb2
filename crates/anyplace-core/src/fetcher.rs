//! Network access for the worker.
//!
//! `Fetcher` is the seam between the caching policies and the network;
//! `HttpFetcher` is the reqwest-backed implementation used by the binary.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::{header, Client, Url};
use tracing::debug;

use crate::error::NetworkError;
use crate::http::{Request, Response, ResponseMeta};

/// Which requests carry the page's credentials (cookies, authorization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

impl CredentialsMode {
    pub fn allows(&self, origin: &Url, target: &Url) -> bool {
        match self {
            CredentialsMode::Omit => false,
            CredentialsMode::SameOrigin => origin.origin() == target.origin(),
            CredentialsMode::Include => true,
        }
    }
}

fn is_credential_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(header::COOKIE.as_str())
        || name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str())
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform one live round-trip. Any HTTP status is a successful fetch;
    /// only transport failures are errors.
    async fn fetch(&self, request: &Request, credentials: CredentialsMode)
        -> Result<Response, NetworkError>;
}

/// HTTP fetcher for the worker's origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: Url, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &Request,
        credentials: CredentialsMode,
    ) -> Result<Response, NetworkError> {
        let forward_credentials = credentials.allows(&self.origin, request.url());

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());
        for (name, value) in request.headers() {
            if is_credential_header(name) && !forward_credentials {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let meta = ResponseMeta {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url: Some(response.url().to_string()),
            headers,
        };
        debug!(url = %request.url(), status = meta.status, "Fetched");

        let stream = response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(NetworkError::from)
            .boxed();
        Ok(Response::streaming(meta, stream))
    }
}
