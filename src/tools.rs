use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use crate::client::{Endpoint, LokiClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LokiMcpError, Result};
use crate::model::QueryRequest;
use crate::normalize;
use crate::params::ParamBuilder;

pub const TOOL_NAMES: [&str; 5] = [
    "query_range",
    "instant_query",
    "get_labels",
    "get_label_values",
    "get_log_stats",
];

/// The five exposed tools. Backend failures are logged and turned into an
/// empty value; malformed input is returned as an error.
#[derive(Clone)]
pub struct LokiTools {
    client: LokiClient,
    params: ParamBuilder,
}

impl LokiTools {
    pub fn new(client: LokiClient, params: ParamBuilder) -> Self {
        Self { client, params }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::new(
            LokiClient::from_config(config)?,
            ParamBuilder::new(clock, config.default_window),
        ))
    }

    pub async fn query_range(&self, req: &QueryRequest) -> Result<Vec<Value>> {
        let params = self.params.range(req)?;
        let body = self.client.call(&Endpoint::QueryRange, &params).await;
        Ok(absorb("query_range", body)?.map(|b| normalize::results(&b)).unwrap_or_default())
    }

    pub async fn instant_query(&self, req: &QueryRequest) -> Result<Vec<Value>> {
        let params = self.params.instant(req)?;
        let body = self.client.call(&Endpoint::Query, &params).await;
        Ok(absorb("instant_query", body)?.map(|b| normalize::results(&b)).unwrap_or_default())
    }

    pub async fn get_labels(&self, req: &QueryRequest) -> Result<Vec<String>> {
        let params = self.params.labels(req)?;
        let body = self.client.call(&Endpoint::Labels, &params).await;
        Ok(absorb("get_labels", body)?.map(|b| normalize::strings(&b)).unwrap_or_default())
    }

    pub async fn get_label_values(&self, req: &QueryRequest) -> Result<Vec<String>> {
        let label = match req.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => return Err(LokiMcpError::InvalidRequest("label is required".into())),
        };
        let params = self.params.labels(req)?;
        let body = self.client.call(&Endpoint::LabelValues(label), &params).await;
        Ok(absorb("get_label_values", body)?.map(|b| normalize::strings(&b)).unwrap_or_default())
    }

    pub async fn get_log_stats(&self, req: &QueryRequest) -> Result<Value> {
        let params = self.params.stats(req)?;
        let body = self.client.call(&Endpoint::IndexStats, &params).await;
        Ok(absorb("get_log_stats", body)?
            .map(normalize::stats)
            .unwrap_or_else(normalize::empty_object))
    }

    /// Runs a tool by name and serialises its result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let req: QueryRequest = serde_json::from_value(arguments)
            .map_err(|e| LokiMcpError::InvalidRequest(format!("invalid arguments: {e}")))?;

        let value = match name {
            "query_range" => Value::from(self.query_range(&req).await?),
            "instant_query" => Value::from(self.instant_query(&req).await?),
            "get_labels" => Value::from(self.get_labels(&req).await?),
            "get_label_values" => Value::from(self.get_label_values(&req).await?),
            "get_log_stats" => self.get_log_stats(&req).await?,
            other => return Err(LokiMcpError::InvalidRequest(format!("unknown tool: {other}"))),
        };
        Ok(value)
    }
}

/// Backend failures become `None`; anything else is passed on.
fn absorb(tool: &str, body: Result<Value>) -> Result<Option<Value>> {
    match body {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_backend() => {
            error!(tool, error = %e, "backend call failed, returning empty result");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Tool descriptors for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    let time_props = json!({
        "start": { "type": "integer", "description": "Start time in nanoseconds since the Unix epoch" },
        "end": { "type": "integer", "description": "End time in nanoseconds since the Unix epoch" }
    });
    let with = |extra: Value| {
        let mut props = time_props.clone();
        if let (Some(props), Some(extra)) = (props.as_object_mut(), extra.as_object()) {
            props.extend(extra.clone());
        }
        props
    };
    let query_prop = json!({ "type": "string", "description": "LogQL expression" });
    let limit_prop = json!({ "type": "integer", "minimum": 1, "default": 100 });
    let direction_prop = json!({ "type": "string", "enum": ["forward", "backward"], "default": "backward" });
    let window_prop = json!({ "type": "string", "pattern": "^[0-9]+[mhd]$", "description": "Window size such as 5m, 1h or 1d, used when start is omitted" });
    let step_prop = json!({ "type": "string", "description": "Query resolution step, forwarded to Loki; also the window size (5m, 1h, 1d) when start and interval are omitted" });

    vec![
        json!({
            "name": "query_range",
            "description": "Query logs over a time range from Loki.",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": with(json!({
                    "query": query_prop,
                    "limit": limit_prop,
                    "interval": window_prop,
                    "step": step_prop,
                    "direction": direction_prop
                }))
            }
        }),
        json!({
            "name": "instant_query",
            "description": "Evaluate a LogQL query at a single point in time (end, default now).",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": query_prop,
                    "limit": limit_prop,
                    "end": time_props["end"],
                    "direction": direction_prop
                }
            }
        }),
        json!({
            "name": "get_labels",
            "description": "List label names known to Loki.",
            "inputSchema": {
                "type": "object",
                "properties": with(json!({ "query": query_prop }))
            }
        }),
        json!({
            "name": "get_label_values",
            "description": "List the values of one label.",
            "inputSchema": {
                "type": "object",
                "required": ["label"],
                "properties": with(json!({
                    "label": { "type": "string", "minLength": 1 },
                    "query": query_prop
                }))
            }
        }),
        json!({
            "name": "get_log_stats",
            "description": "Index statistics (streams, chunks, bytes, entries) for a stream selector.",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": with(json!({ "query": query_prop }))
            }
        }),
    ]
}
