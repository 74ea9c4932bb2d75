//! HTTP worker client.
//!
//! Speaks the worker surface: `POST /start`, `POST /stop`, `GET /status`.
//! Every failure mode collapses into `WorkerUnreachable` because the
//! caller cannot trust the worker's state in any of them.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StartRequest, WorkerStatus};
use crate::domain::ports::WorkerClient;

/// reqwest-backed [`WorkerClient`].
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    /// Reusable HTTP client with connection pooling
    http_client: ReqwestClient,
}

impl HttpWorkerClient {
    /// Build a client with no default timeout; each call sets its own.
    pub fn new() -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .user_agent(concat!("fleetkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(http_client: ReqwestClient) -> Self {
        Self { http_client }
    }

    fn url(endpoint: &str, path: &str) -> String {
        format!("{}/{}", endpoint.trim_end_matches('/'), path)
    }

    async fn post_command(
        &self,
        endpoint: &str,
        path: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> DomainResult<()> {
        let url = Self::url(endpoint, path);
        debug!(%url, "sending worker command");

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::unreachable(endpoint, format!("{path} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::unreachable(
                endpoint,
                format!("{path} returned {status}: {body}"),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn start(
        &self,
        endpoint: &str,
        request: &StartRequest,
        timeout: Duration,
    ) -> DomainResult<()> {
        let body = serde_json::to_value(request)
            .map_err(|e| DomainError::unreachable(endpoint, format!("start encode failed: {e}")))?;
        self.post_command(endpoint, "start", &body, timeout).await
    }

    async fn stop(&self, endpoint: &str, timeout: Duration) -> DomainResult<()> {
        self.post_command(endpoint, "stop", &serde_json::json!({}), timeout)
            .await
    }

    async fn get_status(&self, endpoint: &str, timeout: Duration) -> DomainResult<WorkerStatus> {
        let url = Self::url(endpoint, "status");

        let response = self
            .http_client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DomainError::unreachable(endpoint, format!("status request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::unreachable(
                endpoint,
                format!("status returned {status}"),
            ));
        }

        response
            .json::<WorkerStatus>()
            .await
            .map_err(|e| DomainError::unreachable(endpoint, format!("status parse failed: {e}")))
    }
}
