//! Fallback discovery for servers missing from the ToolHive registry:
//! probe the public npm registry and Docker Hub for plausibly matching
//! packages and report runnable targets.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use toolhive_mcp_core::ThvError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// One runnable candidate discovered outside the registry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebFinding {
    /// Index that produced the hit: `npm` or `docker_hub`.
    pub source: String,
    /// Package or image name as published.
    pub identifier: String,
    /// Human-facing page for the package.
    pub url: String,
    /// Value to pass to the run operation to start this candidate.
    pub run_target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Probe the indexes for `server_name`. Unreachable indexes and misses
    /// are silent; only the hits come back.
    async fn find_candidates(&self, server_name: &str) -> Result<Vec<WebFinding>, ThvError>;
}

/// Probes registry.npmjs.org and hub.docker.com. Base URLs are injectable
/// for tests.
#[derive(Debug, Clone)]
pub struct PackageIndexSearch {
    http: reqwest::Client,
    npm_base: String,
    docker_base: String,
}

impl PackageIndexSearch {
    pub fn new() -> Result<Self, ThvError> {
        Self::with_bases("https://registry.npmjs.org", "https://hub.docker.com")
    }

    pub fn with_bases(
        npm_base: impl Into<String>,
        docker_base: impl Into<String>,
    ) -> Result<Self, ThvError> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ThvError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            npm_base: npm_base.into().trim_end_matches('/').to_string(),
            docker_base: docker_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// GET a probe URL; `None` on any failure or non-2xx answer.
    async fn probe(&self, url: &str) -> Option<Value> {
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response.json().await.ok(),
            Ok(response) => {
                debug!(%url, status = %response.status(), "index probe miss");
                None
            }
            Err(e) => {
                debug!(%url, error = %e, "index probe failed");
                None
            }
        }
    }

    async fn probe_npm(&self, package: &str) -> Option<WebFinding> {
        let body = self.probe(&format!("{}/{package}", self.npm_base)).await?;
        Some(WebFinding {
            source: "npm".to_string(),
            identifier: package.to_string(),
            url: format!("https://www.npmjs.com/package/{package}"),
            run_target: format!("npx://{package}"),
            description: body["description"].as_str().map(str::to_string),
        })
    }

    async fn probe_docker(&self, name: &str) -> Option<WebFinding> {
        let body = self
            .probe(&format!("{}/v2/repositories/mcp/{name}/", self.docker_base))
            .await?;
        Some(WebFinding {
            source: "docker_hub".to_string(),
            identifier: format!("mcp/{name}"),
            url: format!("https://hub.docker.com/r/mcp/{name}"),
            run_target: format!("mcp/{name}:latest"),
            description: body["description"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl WebSearch for PackageIndexSearch {
    async fn find_candidates(&self, server_name: &str) -> Result<Vec<WebFinding>, ThvError> {
        let prefixed = format!("mcp-{server_name}");
        let (plain, with_prefix, docker) = tokio::join!(
            self.probe_npm(server_name),
            self.probe_npm(&prefixed),
            self.probe_docker(server_name),
        );
        let findings: Vec<WebFinding> = [plain, with_prefix, docker]
            .into_iter()
            .flatten()
            .collect();
        debug!(server_name, hits = findings.len(), "index search finished");
        Ok(findings)
    }
}
