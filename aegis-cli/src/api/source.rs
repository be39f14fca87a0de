//! Remote resource source trait and HTTP implementation

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiError;
use super::resilience::RateLimiter;
use crate::registry::ResourceDef;

/// Narrow interface the engines consume for all remote operations.
///
/// Implementations classify every failure into [`ApiError`]; the engines
/// never inspect transport details.
#[async_trait]
pub trait RemoteResourceSource: Send + Sync {
    /// Fetch the full listing for a resource type.
    async fn list(&self, def: &ResourceDef) -> Result<Vec<Value>, ApiError>;

    /// Create a resource; returns the created payload (including the
    /// target-assigned identifier).
    async fn create(&self, def: &ResourceDef, payload: &Value) -> Result<Value, ApiError>;

    /// Update an existing resource by target identifier.
    async fn update(&self, def: &ResourceDef, id: &str, payload: &Value) -> Result<(), ApiError>;
}

/// reqwest-backed source for one tenant: bearer auth, a shared rolling-window
/// rate limiter, and a timeout on every call.
pub struct HttpResourceSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl HttpResourceSource {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.into(),
            limiter,
            timeout,
        }
    }

    /// Build a source from the environment: the API token comes from
    /// `AEGIS_API_TOKEN` (credential storage is an external concern).
    pub fn from_env(
        base_url: &str,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let token = std::env::var("AEGIS_API_TOKEN")
            .map_err(|_| ApiError::Fatal("AEGIS_API_TOKEN is not set".into()))?;
        if token.trim().is_empty() {
            return Err(ApiError::Fatal("AEGIS_API_TOKEN is empty".into()));
        }
        Ok(Self::new(base_url, token, limiter, timeout))
    }

    fn url(&self, def: &ResourceDef) -> String {
        format!("{}/api/v1/{}", self.base_url, def.endpoint)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        self.limiter.acquire().await;
        let fut = request.bearer_auth(&self.token).send();
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(ApiError::Transient(format!("request failed: {}", err))),
            Err(_) => Err(ApiError::Transient(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED && body.to_uppercase().contains("INVALID_TOKEN") {
            // The token itself is bad: every type would fail identically.
            return Err(ApiError::Fatal(format!("tenant authentication failed: {}", body)));
        }
        Err(ApiError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl RemoteResourceSource for HttpResourceSource {
    async fn list(&self, def: &ResourceDef) -> Result<Vec<Value>, ApiError> {
        let url = self.url(def);
        debug!("GET {}", url);
        let response = self.send(self.client.get(&url)).await?;
        let response = self.check(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("invalid JSON from {}: {}", url, e)))?;
        match body {
            Value::Array(items) => Ok(items),
            // Singleton endpoints (allowlist/denylist) return one object.
            Value::Object(_) => Ok(vec![body]),
            other => Err(ApiError::Transient(format!(
                "unexpected listing shape from {}: {}",
                url,
                other
            ))),
        }
    }

    async fn create(&self, def: &ResourceDef, payload: &Value) -> Result<Value, ApiError> {
        let url = self.url(def);
        debug!("POST {}", url);
        let response = self.send(self.client.post(&url).json(payload)).await?;
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("invalid JSON from {}: {}", url, e)))
    }

    async fn update(&self, def: &ResourceDef, id: &str, payload: &Value) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.url(def), id);
        debug!("PUT {}", url);
        let response = self.send(self.client.put(&url).json(payload)).await?;
        if let Err(err) = self.check(response).await {
            warn!("update {} {} failed: {}", def.resource_type, id, err);
            return Err(err);
        }
        Ok(())
    }
}
