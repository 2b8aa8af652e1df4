use std::time::Duration;

use crate::error::{LokiMcpError, Result};
use crate::interval::parse_interval;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Stdio,
            http_addr: "0.0.0.0".to_string(),
            http_port: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the log backend, without a trailing slash.
    pub loki_url: String,
    pub timeout: Duration,
    pub default_window: Option<Duration>,
    pub log_level: String,
    pub server: ServerConfig,
}

impl Config {
    pub fn new(loki_url: impl Into<String>) -> Self {
        Self {
            loki_url: loki_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_window: None,
            log_level: "info".to_string(),
            server: ServerConfig::default(),
        }
    }

    /// Reads the process environment. Call [`load_dotenv`] first to pick up
    /// a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let loki_url = get("LOKI_URL").ok_or_else(|| {
            LokiMcpError::ConfigError("Missing environment variable: LOKI_URL".into())
        })?;
        let mut cfg = Config::new(loki_url);

        if let Some(raw) = get("LOKI_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                LokiMcpError::ConfigError(format!("LOKI_TIMEOUT_SECS must be an integer, got {raw}"))
            })?;
            cfg.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(raw) = get("LOKI_DEFAULT_WINDOW") {
            cfg.default_window = Some(parse_interval(&raw).map_err(|e| {
                LokiMcpError::ConfigError(format!("LOKI_DEFAULT_WINDOW: {e}"))
            })?);
        }
        if let Some(level) = get("LOG_LEVEL") {
            cfg.log_level = level.to_lowercase();
        }
        if let Some(mode) = get("MCP_TRANSPORT") {
            cfg.server.mode = match mode.to_lowercase().as_str() {
                "stdio" => ServerMode::Stdio,
                "http" => ServerMode::Http,
                "both" => ServerMode::Both,
                other => {
                    return Err(LokiMcpError::ConfigError(format!(
                        "MCP_TRANSPORT must be stdio, http or both, got {other}"
                    )))
                }
            };
        }
        if let Some(addr) = get("MCP_HTTP_ADDR") {
            cfg.server.http_addr = addr;
        }
        if let Some(raw) = get("MCP_HTTP_PORT") {
            cfg.server.http_port = raw.parse().map_err(|_| {
                LokiMcpError::ConfigError(format!("MCP_HTTP_PORT must be a port number, got {raw}"))
            })?;
        }
        Ok(cfg)
    }
}

/// Loads `.env` without overriding variables already set. A missing file is
/// fine; any other failure is handed back so it can be logged once tracing is
/// up.
pub fn load_dotenv() -> Option<dotenvy::Error> {
    dotenv_problem(dotenvy::dotenv())
}

fn dotenv_problem<T>(res: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match res {
        Ok(_) => None,
        Err(e) if e.not_found() => None,
        Err(e) => Some(e),
    }
}
