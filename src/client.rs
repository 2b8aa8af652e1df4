use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{LokiMcpError, Result};
use crate::params::QueryParams;

const API_PREFIX: &str = "loki/api/v1";
const LOG_BODY_LIMIT: usize = 1024;

/// Query API endpoints the adapter talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    QueryRange,
    Query,
    Labels,
    LabelValues(String),
    IndexStats,
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::QueryRange => "query_range".to_string(),
            Endpoint::Query => "query".to_string(),
            Endpoint::Labels => "labels".to_string(),
            Endpoint::LabelValues(name) => format!("label/{}/values", urlencoding::encode(name)),
            Endpoint::IndexStats => "index/stats".to_string(),
        }
    }
}

/// HTTP client for the backend query API. Clone it freely; clones share one
/// connection pool.
#[derive(Clone)]
pub struct LokiClient {
    base_url: String,
    http: reqwest::Client,
}

impl LokiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LokiMcpError::ConfigError(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.loki_url.clone(), config.timeout)
    }

    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, endpoint.path())
    }

    /// One GET, no retries.
    pub async fn call(&self, endpoint: &Endpoint, params: &QueryParams) -> Result<Value> {
        let url = self.url(endpoint);
        info!(endpoint = %endpoint.path(), params = ?params, "querying backend");

        let response = self.http.get(&url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        info!(
            endpoint = %endpoint.path(),
            status = status.as_u16(),
            body = %truncate(&body, LOG_BODY_LIMIT),
            "backend responded"
        );

        if !status.is_success() {
            return Err(LokiMcpError::BackendHttp {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            debug!(endpoint = %endpoint.path(), "empty response body");
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| LokiMcpError::BackendTransport(format!("undecodable response body: {e}")))
    }
}

fn truncate(s: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]).into(),
        None => s.into(),
    }
}
