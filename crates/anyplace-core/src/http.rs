//! Request and response types flowing through the worker.
//!
//! A `Response` body is consumed exactly once. Bodies coming off the network
//! are streams; the only way to hand the same response to both the page and
//! the cache store is [`Response::duplicate`], which drains the stream once
//! and yields two independent copies.

use std::fmt;

use futures::stream::{BoxStream, StreamExt};
use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::NetworkError;
use crate::store::CachedResponse;

// ============================================================================
// Requests
// ============================================================================

/// Identity of a cache entry: upper-case method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str().to_ascii_uppercase(), url))
    }

    /// Key for a plain GET of `url`, as used for the sync document endpoint
    pub fn for_url(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    pub fn get(url: &str) -> Result<Self, NetworkError> {
        let url = Url::parse(url)
            .map_err(|e| NetworkError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::new(Method::GET, url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

// ============================================================================
// Bodies
// ============================================================================

pub enum Body {
    Buffered(Vec<u8>),
    Stream(BoxStream<'static, Result<Vec<u8>, NetworkError>>),
}

impl Body {
    pub fn empty() -> Self {
        Body::Buffered(Vec::new())
    }

    /// Read the whole body, consuming it.
    pub async fn into_bytes(self) -> Result<Vec<u8>, NetworkError> {
        match self {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf)
            }
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Buffered(bytes)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Buffered(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Buffered(bytes) => write!(f, "Body::Buffered({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Everything about a response except its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: String::new(),
            url: None,
            headers: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug)]
pub struct Response {
    meta: ResponseMeta,
    body: Body,
}

impl Response {
    pub fn new(meta: ResponseMeta, body: impl Into<Body>) -> Self {
        Self {
            meta,
            body: body.into(),
        }
    }

    pub fn streaming(
        meta: ResponseMeta,
        stream: BoxStream<'static, Result<Vec<u8>, NetworkError>>,
    ) -> Self {
        Self {
            meta,
            body: Body::Stream(stream),
        }
    }

    /// A live response re-served from a stored snapshot.
    pub fn from_cached(cached: &CachedResponse) -> Self {
        Self {
            meta: cached.meta.clone(),
            body: Body::Buffered(cached.body.clone()),
        }
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }

    pub fn is_ok(&self) -> bool {
        self.meta.is_ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub async fn bytes(self) -> Result<Vec<u8>, NetworkError> {
        self.body.into_bytes().await
    }

    pub async fn text(self) -> Result<String, NetworkError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parse the body as JSON. Read failures and parse failures are kept
    /// apart so callers can tell a dropped connection from a bad document.
    pub async fn json<T: DeserializeOwned>(self) -> Result<serde_json::Result<T>, NetworkError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes))
    }

    /// Drain the body once and return two independent copies: the first for
    /// the caller, the second for the cache store.
    pub async fn duplicate(self) -> Result<(Response, Response), NetworkError> {
        let Response { meta, body } = self;
        let bytes = body.into_bytes().await?;
        let copy = Response {
            meta: meta.clone(),
            body: Body::Buffered(bytes.clone()),
        };
        Ok((
            Response {
                meta,
                body: Body::Buffered(bytes),
            },
            copy,
        ))
    }

    /// Consume the response into a snapshot suitable for the cache store.
    pub async fn into_snapshot(self) -> Result<CachedResponse, NetworkError> {
        let Response { meta, body } = self;
        let body = body.into_bytes().await?;
        Ok(CachedResponse::new(meta, body))
    }
}

// ============================================================================
// Tests
// ============================================================================
