use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::error::Result;
use crate::tools::{tool_definitions, LokiTools, TOOL_NAMES};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn run_stdio(tools: Arc<LokiTools>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    serve_lines(tools, BufReader::new(stdin), stdout).await
}

/// Newline-delimited JSON-RPC over any reader/writer pair.
pub async fn serve_lines<R, W>(tools: Arc<LokiTools>, reader: R, mut writer: W) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unparsable request line");
                let resp = error_response(Value::Null, -32700, format!("parse error: {e}"));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };
        if let Some(resp) = process_request(tools.clone(), req).await {
            write_response(&mut writer, &resp).await?;
        }
    }
    Ok(())
}

/// Handles one request. Notifications yield `None`.
pub async fn process_request(tools: Arc<LokiTools>, req: RpcRequest) -> Option<RpcResponse> {
    debug!(method = %req.method, "rpc request");
    let method = req.method.clone();
    let resp = match method.as_str() {
        "initialize" => handle_initialize(&req),
        m if m.starts_with("notifications/") => {
            if req.id.is_null() {
                return None;
            }
            success(req.id, json!({}))
        }
        "ping" => success(req.id, json!({})),
        "tools/list" => success(req.id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(&tools, req).await,
        _ => error_response(req.id, -32601, format!("method not found: {method}")),
    };
    Some(resp)
}

fn handle_initialize(req: &RpcRequest) -> RpcResponse {
    success(
        req.id.clone(),
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

async fn handle_tool_call(tools: &LokiTools, req: RpcRequest) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => return error_response(req.id, -32602, format!("invalid params: {e}")),
    };
    if !TOOL_NAMES.contains(&params.name.as_str()) {
        return error_response(req.id, -32602, format!("unknown tool: {}", params.name));
    }

    let (text, is_error) = match tools.call_tool(&params.name, params.arguments).await {
        Ok(value) => (serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string()), false),
        Err(e) => {
            warn!(tool = %params.name, error = %e, "tool call rejected");
            (e.to_string(), true)
        }
    };
    success(
        req.id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error
        }),
    )
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn success(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}
