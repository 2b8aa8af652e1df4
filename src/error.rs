use thiserror::Error;

pub type Result<T> = std::result::Result<T, LokiMcpError>;

#[derive(Debug, Error)]
pub enum LokiMcpError {
    #[error("invalid interval format: {input}")]
    InvalidIntervalFormat { input: String },

    #[error("cannot derive query window: set start, interval or step")]
    MissingWindowSpecifier,

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("backend returned HTTP {status}: {body}")]
    BackendHttp { status: u16, body: String },

    #[error("backend transport error: {0}")]
    BackendTransport(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LokiMcpError {
    /// Failures caused by the log backend rather than by the caller's input.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            LokiMcpError::BackendHttp { .. } | LokiMcpError::BackendTransport(_)
        )
    }
}

impl From<reqwest::Error> for LokiMcpError {
    fn from(e: reqwest::Error) -> Self {
        LokiMcpError::BackendTransport(e.to_string())
    }
}
