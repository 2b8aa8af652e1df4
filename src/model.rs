use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_LIMIT: u32 = 100;

/// Matcher clients send when they mean "every stream".
pub const EMPTY_MATCHER: &str = "{}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    #[default]
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            other => Err(serde::de::Error::custom(format!(
                "direction must be forward or backward, got {other}"
            ))),
        }
    }
}

/// Input shared by every tool. Fields a tool has no use for are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub start: Option<i64>,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub label: Option<String>,
    /// Reserved for stream-selector filtering; not forwarded to the backend.
    #[serde(default)]
    pub selector: Option<String>,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            query: None,
            limit: DEFAULT_LIMIT,
            start: None,
            end: None,
            interval: None,
            step: None,
            direction: Direction::default(),
            label: None,
            selector: None,
        }
    }
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Window-size hint: `interval` wins over `step` when both are set.
    pub fn window_hint(&self) -> Option<&str> {
        self.interval.as_deref().or(self.step.as_deref())
    }
}
