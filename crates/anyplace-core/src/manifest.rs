//! Static assets seeded into the cache at install time.

use reqwest::Url;

use crate::error::WorkerError;
use crate::http::Request;

/// Assets needed to run the app offline. Keep this list compact.
pub const STATIC_ASSETS: &[&str] = &[
    // app shell
    "./index.html",
    "./styles.css",
    "./anyplace-service-worker.js",
    "./components/AppConfig.js",
    "./components/Application.js",
    "./components/LeafletMapController.js",
    "./components/ServiceComponent.js",
    // timeline
    "./timeline/timeline.js",
    "./timeline/img/cd-arrow.svg",
    // leaflet
    "./leaflet/images/layers-2x.png",
    "./leaflet/images/layers.png",
    "./leaflet/images/marker-icon-2x.png",
    "./leaflet/images/marker-icon.png",
    "./leaflet/images/marker-shadow.png",
    "./leaflet/leaflet.css",
    "./leaflet/leaflet.js",
    // pinned external resources
    "https://cdn.jsdelivr.net/npm/@shoelace-style/shoelace@2.0.0-beta.37/dist/themes/base.css",
    "https://cdn.jsdelivr.net/npm/@shoelace-style/shoelace@2.0.0-beta.37/dist/shoelace.js",
    "https://cdnjs.cloudflare.com/ajax/libs/jquery/2.1.3/jquery.min.js",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceManifest {
    entries: Vec<String>,
}

impl ResourceManifest {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against `origin` into a GET request.
    /// Absolute URLs are kept as they are.
    pub fn requests(&self, origin: &Url) -> Result<Vec<Request>, WorkerError> {
        self.entries
            .iter()
            .map(|entry| {
                origin
                    .join(entry)
                    .map(|url| Request::new(reqwest::Method::GET, url))
                    .map_err(|e| WorkerError::seeding(entry.as_str(), e))
            })
            .collect()
    }
}

impl Default for ResourceManifest {
    fn default() -> Self {
        Self::new(STATIC_ASSETS.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_resolve_relative_and_absolute() {
        let manifest = ResourceManifest::new(vec![
            "./index.html".to_string(),
            "/b.css".to_string(),
            "https://cdnjs.cloudflare.com/ajax/libs/jquery/2.1.3/jquery.min.js".to_string(),
        ]);
        let origin = Url::parse("http://localhost:8080/anyplace/").unwrap();
        let urls: Vec<String> = manifest
            .requests(&origin)
            .unwrap()
            .iter()
            .map(|r| r.url().to_string())
            .collect();

        assert_eq!(
            urls,
            vec![
                "http://localhost:8080/anyplace/index.html",
                "http://localhost:8080/b.css",
                "https://cdnjs.cloudflare.com/ajax/libs/jquery/2.1.3/jquery.min.js",
            ]
        );
    }

    #[test]
    fn test_default_manifest_is_the_static_list() {
        let manifest = ResourceManifest::default();
        assert_eq!(manifest.len(), STATIC_ASSETS.len());
        assert!(manifest
            .entries()
            .iter()
            .all(|e| e.starts_with("./") || e.starts_with("https://")));
    }
}
