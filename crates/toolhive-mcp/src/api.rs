//! HTTP client for the ToolHive control-plane API.
//!
//! Every management endpoint the dispatcher needs is surfaced through the
//! [`ControlPlane`] trait so operation handlers can be exercised against
//! in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use toolhive_mcp_core::ThvError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Registry mutations touch upstream git/http sources and get more slack.
const MUTATION_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Management surface of the ToolHive API server.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Probe `/health`. Returns `Ok(true)` only when the API answers 204.
    async fn health(&self) -> Result<bool, ThvError>;
    async fn list_servers(&self) -> Result<Value, ThvError>;
    async fn stop_server(&self, name: &str) -> Result<(), ThvError>;
    async fn version(&self) -> Result<Value, ThvError>;
    async fn list_registries(&self) -> Result<Value, ThvError>;
    async fn registry_details(&self, name: &str) -> Result<Value, ThvError>;
    async fn add_registry(&self, data: &Value) -> Result<Value, ThvError>;
    async fn remove_registry(&self, name: &str) -> Result<(), ThvError>;
    async fn client_discovery(&self) -> Result<Value, ThvError>;
    async fn openapi_spec(&self) -> Result<Value, ThvError>;
}

/// `reqwest`-backed [`ControlPlane`] implementation.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Result<Self, ThvError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ThvError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn map_request_error(err: reqwest::Error) -> ThvError {
        if err.is_timeout() {
            ThvError::timeout(err.to_string())
        } else {
            ThvError::transport(err.to_string())
        }
    }

    /// Convert a non-success status into the error taxonomy. `subject` names
    /// the thing a 404 refers to.
    fn check_status(status: StatusCode, subject: &str) -> Result<(), ThvError> {
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(ThvError::not_found(format!("{subject} not found")))
        } else {
            Err(ThvError::transport(format!(
                "API returned status {status} for {subject}"
            )))
        }
    }

    async fn get_json(&self, path: &str, subject: &str) -> Result<Value, ThvError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_status(response.status(), subject)?;
        response
            .json()
            .await
            .map_err(|e| ThvError::parse(format!("invalid JSON from {path}: {e}")))
    }
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn health(&self) -> Result<bool, ThvError> {
        let url = self.url("/health");
        let response = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Ok(response.status() == StatusCode::NO_CONTENT)
    }

    async fn list_servers(&self) -> Result<Value, ThvError> {
        self.get_json("/api/v1beta/servers", "server list").await
    }

    async fn stop_server(&self, name: &str) -> Result<(), ThvError> {
        let url = self.url(&format!("/api/v1beta/servers/{name}/stop"));
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_status(response.status(), &format!("server '{name}'"))
    }

    async fn version(&self) -> Result<Value, ThvError> {
        self.get_json("/api/v1beta/version", "version").await
    }

    async fn list_registries(&self) -> Result<Value, ThvError> {
        self.get_json("/api/v1beta/registry", "registry list").await
    }

    async fn registry_details(&self, name: &str) -> Result<Value, ThvError> {
        self.get_json(
            &format!("/api/v1beta/registry/{name}"),
            &format!("registry '{name}'"),
        )
        .await
    }

    async fn add_registry(&self, data: &Value) -> Result<Value, ThvError> {
        let url = self.url("/api/v1beta/registry");
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .timeout(MUTATION_TIMEOUT)
            .json(data)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let status = response.status();
        Self::check_status(status, "registry")?;
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json()
            .await
            .map_err(|e| ThvError::parse(format!("invalid JSON from registry create: {e}")))
    }

    async fn remove_registry(&self, name: &str) -> Result<(), ThvError> {
        let url = self.url(&format!("/api/v1beta/registry/{name}"));
        debug!(%url, "DELETE");
        let response = self
            .http
            .delete(&url)
            .timeout(MUTATION_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_status(response.status(), &format!("registry '{name}'"))
    }

    async fn client_discovery(&self) -> Result<Value, ThvError> {
        self.get_json("/api/v1beta/discovery/clients", "client discovery")
            .await
    }

    async fn openapi_spec(&self) -> Result<Value, ThvError> {
        self.get_json("/api/openapi.json", "OpenAPI spec").await
    }
}
