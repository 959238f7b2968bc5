//! An npm-compatible registry client.

use crate::resolver::{ExternalResolver, PackageMetadata, select_version};
use crate::{Error, Result};
use async_trait::async_trait;
use monodep_versions::SemanticVersion;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default public registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

// Abbreviated documents carry everything resolution needs.
const ABBREVIATED_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8";

/// Connection settings for [`HttpRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRegistryConfig {
    /// Registry base URL.
    pub url: String,
    /// Ceiling on requests started per second.
    pub requests_per_second: u32,
    /// Per-request client timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpRegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            requests_per_second: 10,
            timeout_secs: 30,
            user_agent: format!("monodep/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, VersionDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionDocument {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    deprecated: Option<serde_json::Value>,
}

impl Packument {
    fn sorted_versions(&self) -> Vec<SemanticVersion> {
        let mut versions: Vec<SemanticVersion> = self
            .versions
            .keys()
            .filter_map(|v| SemanticVersion::parse(v).ok())
            .collect();
        versions.sort();
        versions
    }

    fn latest(&self) -> Option<SemanticVersion> {
        self.dist_tags
            .get("latest")
            .and_then(|v| SemanticVersion::parse(v).ok())
    }

    fn document(&self, version: &SemanticVersion) -> Option<&VersionDocument> {
        self.versions.get(&version.to_string()).or_else(|| {
            self.versions
                .iter()
                .find(|(raw, _)| SemanticVersion::parse(raw).is_ok_and(|v| &v == version))
                .map(|(_, doc)| doc)
        })
    }
}

/// Starts at most one request per interval.
#[derive(Debug)]
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    fn new(requests_per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / requests_per_second.max(1),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *next_slot > now {
            tokio::time::sleep_until(*next_slot).await;
        }
        *next_slot = (*next_slot).max(now) + self.interval;
    }
}

/// [`ExternalResolver`] backed by an npm-compatible HTTP registry.
///
/// Package documents are fetched once per instance and kept for its
/// lifetime.
#[derive(Debug)]
pub struct HttpRegistry {
    client: reqwest::Client,
    config: HttpRegistryConfig,
    limiter: RateLimiter,
    packuments: RwLock<HashMap<String, Arc<Packument>>>,
}

impl HttpRegistry {
    /// Create a client for the configured registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the HTTP client cannot be built.
    pub fn new(config: HttpRegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(config.requests_per_second),
            config,
            packuments: RwLock::new(HashMap::new()),
        })
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &HttpRegistryConfig {
        &self.config
    }

    fn document_url(&self, name: &str) -> String {
        // Scoped names keep the `@` but escape the separator.
        let encoded = name.replace('/', "%2F");
        format!("{}/{encoded}", self.config.url.trim_end_matches('/'))
    }

    async fn packument(&self, name: &str) -> Result<Arc<Packument>> {
        if let Some(cached) = self.packuments.read().get(name) {
            return Ok(Arc::clone(cached));
        }

        self.limiter.acquire().await;
        let url = self.document_url(name);
        tracing::debug!(%url, "Fetching package document");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, ABBREVIATED_ACCEPT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(name, Duration::from_secs(self.config.timeout_secs))
                } else {
                    Error::network(name, e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::package_not_found(name));
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::network(name, e.to_string()))?;
        let packument: Packument =
            serde_json::from_slice(&bytes).map_err(|e| Error::InvalidDocument {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let packument = Arc::new(packument);
        self.packuments
            .write()
            .insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }
}

#[async_trait]
impl ExternalResolver for HttpRegistry {
    async fn resolve_version(&self, name: &str, range: &str) -> Result<SemanticVersion> {
        let packument = self.packument(name).await?;
        select_version(
            name,
            range,
            &packument.sorted_versions(),
            packument.latest().as_ref(),
        )
    }

    async fn get_metadata(&self, name: &str, version: &SemanticVersion) -> Result<PackageMetadata> {
        let packument = self.packument(name).await?;
        let document = packument
            .document(version)
            .ok_or_else(|| Error::version_not_found(name, version.to_string()))?;
        let deprecated = document.deprecated.as_ref().and_then(|d| match d {
            serde_json::Value::String(message) => Some(message.clone()),
            serde_json::Value::Bool(true) => Some("deprecated".to_string()),
            _ => None,
        });
        Ok(PackageMetadata {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: document.dependencies.clone(),
            peer_dependencies: document.peer_dependencies.clone(),
            optional_dependencies: document.optional_dependencies.clone(),
            deprecated,
        })
    }

    async fn exists(&self, name: &str, version: &SemanticVersion) -> bool {
        match self.packument(name).await {
            Ok(packument) => packument.document(version).is_some(),
            Err(e) => {
                tracing::debug!("Existence check for {name}@{version} failed: {e}");
                false
            }
        }
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<SemanticVersion>> {
        Ok(self.packument(name).await?.sorted_versions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "name": "left-pad",
        "dist-tags": {"latest": "1.3.0"},
        "versions": {
            "1.0.0": {},
            "1.3.0": {"dependencies": {"a": "^1.0.0"}, "deprecated": "use String.padStart"},
            "2.0.0-alpha.1": {"peerDependencies": {"b": "*"}},
            "not-a-version": {}
        }
    }"#;

    #[test]
    fn test_packument_versions_are_sorted_and_filtered() {
        let packument: Packument = serde_json::from_str(DOCUMENT).unwrap();
        let versions: Vec<String> = packument
            .sorted_versions()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(versions, vec!["1.0.0", "1.3.0", "2.0.0-alpha.1"]);
        assert_eq!(packument.latest().unwrap().to_string(), "1.3.0");
    }

    #[test]
    fn test_document_lookup() {
        let packument: Packument = serde_json::from_str(DOCUMENT).unwrap();
        let doc = packument
            .document(&SemanticVersion::parse("1.3.0").unwrap())
            .unwrap();
        assert_eq!(doc.dependencies["a"], "^1.0.0");
        assert!(packument
            .document(&SemanticVersion::parse("9.9.9").unwrap())
            .is_none());
    }

    #[test]
    fn test_scoped_names_are_escaped() {
        let registry = HttpRegistry::new(HttpRegistryConfig {
            url: "https://registry.example.com/".to_string(),
            ..HttpRegistryConfig::default()
        })
        .unwrap();
        assert_eq!(
            registry.document_url("@scope/pkg"),
            "https://registry.example.com/@scope%2Fpkg"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(4);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
