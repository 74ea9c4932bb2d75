//! HTTP metric source.
//!
//! Reads a resource's counter from a JSON endpoint. The URL comes from a
//! template with a `{resource}` placeholder and the value from a (possibly
//! dotted) field path in the response object.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MetricConfig;
use crate::domain::ports::MetricSource;

/// reqwest-backed [`MetricSource`].
#[derive(Debug, Clone)]
pub struct HttpMetricSource {
    http_client: ReqwestClient,
    url_template: String,
    value_field: String,
}

impl HttpMetricSource {
    /// Build the HTTP client for the configured metric endpoint.
    pub fn new(config: &MetricConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .user_agent(concat!("fleetkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            url_template: config.url_template.clone(),
            value_field: config.value_field.clone(),
        })
    }

    fn url_for(&self, resource_id: &str) -> String {
        self.url_template.replace("{resource}", resource_id)
    }

    /// Pull the configured field out of a response body.
    fn extract(&self, body: &Value) -> Option<i64> {
        let field = self
            .value_field
            .split('.')
            .try_fold(body, |value, key| value.get(key))?;
        parse_counter(field)
    }
}

/// Accept integers, whole floats and numeric strings like `"12,345"`.
fn parse_counter(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let digits: String = s.trim().chars().filter(|c| *c != ',').collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn read(&self, resource_id: &str, timeout: Duration) -> DomainResult<i64> {
        let url = self.url_for(resource_id);

        let response = self
            .http_client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DomainError::metric_unavailable(resource_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::metric_unavailable(
                resource_id,
                format!("metric endpoint returned {status}"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DomainError::metric_unavailable(resource_id, e))?;

        self.extract(&body).ok_or_else(|| {
            DomainError::metric_unavailable(
                resource_id,
                format!("field '{}' missing or not numeric", self.value_field),
            )
        })
    }
}
