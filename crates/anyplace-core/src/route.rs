//! Maps request URLs to caching policies.

use regex::Regex;
use reqwest::Url;

use crate::error::WorkerError;

/// Pattern for live map-provider traffic. Unanchored and with the dots
/// unescaped, so it also matches the host embedded in a proxied URL path.
pub const MAPBOX_PATTERN: &str = "/api.mapbox.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    NetworkOnly,
    StaleWhileRevalidate,
}

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    network_only: Vec<Regex>,
}

impl RouteClassifier {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, WorkerError> {
        let network_only = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    WorkerError::Config(format!("bad route pattern {:?}: {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { network_only })
    }

    pub fn classify(&self, url: &Url) -> RoutePolicy {
        let url = url.as_str();
        if self.network_only.iter().any(|re| re.is_match(url)) {
            RoutePolicy::NetworkOnly
        } else {
            RoutePolicy::StaleWhileRevalidate
        }
    }
}
