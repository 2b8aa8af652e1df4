use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{LokiMcpError, Result};
use crate::interval::parse_interval;
use crate::model::{QueryRequest, EMPTY_MATCHER};

/// Query-string parameters, sent as-is.
pub type QueryParams = BTreeMap<String, String>;

/// Turns a [`QueryRequest`] into the parameter set of one backend endpoint.
#[derive(Clone)]
pub struct ParamBuilder {
    clock: Arc<dyn Clock>,
    default_window: Option<Duration>,
}

impl ParamBuilder {
    pub fn new(clock: Arc<dyn Clock>, default_window: Option<Duration>) -> Self {
        Self {
            clock,
            default_window,
        }
    }

    /// `query_range`: start and end are always resolved.
    pub fn range(&self, req: &QueryRequest) -> Result<QueryParams> {
        let query = required_query(req)?;
        check_limit(req)?;
        let (start, end) = self.resolve_window(req)?;

        let mut params = QueryParams::new();
        params.insert("query".into(), query.to_string());
        params.insert("limit".into(), req.limit.to_string());
        params.insert("start".into(), start.to_string());
        params.insert("end".into(), end.to_string());
        params.insert("direction".into(), req.direction.as_str().into());
        // Loki's query resolution; forwarded as given.
        if let Some(step) = req.step.as_deref() {
            params.insert("step".into(), step.to_string());
        }
        Ok(params)
    }

    /// `query`: evaluated at `end`, or now.
    pub fn instant(&self, req: &QueryRequest) -> Result<QueryParams> {
        let query = required_query(req)?;
        check_limit(req)?;
        let time = req.end.unwrap_or_else(|| self.clock.now_ns());

        let mut params = QueryParams::new();
        params.insert("query".into(), query.to_string());
        params.insert("limit".into(), req.limit.to_string());
        params.insert("time".into(), time.to_string());
        params.insert("direction".into(), req.direction.as_str().into());
        Ok(params)
    }

    /// `labels` and `label/{name}/values`. Time bounds are forwarded only when
    /// given so the backend applies its own defaults.
    pub fn labels(&self, req: &QueryRequest) -> Result<QueryParams> {
        let mut params = passthrough_bounds(req)?;
        let query = normalize_label_query(req.query.as_deref());
        if !query.is_empty() {
            params.insert("query".into(), query.to_string());
        }
        Ok(params)
    }

    /// `index/stats`.
    pub fn stats(&self, req: &QueryRequest) -> Result<QueryParams> {
        let query = required_query(req)?;
        let mut params = passthrough_bounds(req)?;
        params.insert("query".into(), query.to_string());
        Ok(params)
    }

    fn resolve_window(&self, req: &QueryRequest) -> Result<(i64, i64)> {
        let end = req.end.unwrap_or_else(|| self.clock.now_ns());
        let start = match req.start {
            Some(start) => start,
            None => {
                let window = match req.window_hint() {
                    Some(hint) => parse_interval(hint)?,
                    None => self
                        .default_window
                        .ok_or(LokiMcpError::MissingWindowSpecifier)?,
                };
                let window_ns = i64::try_from(window.as_nanos()).unwrap_or(i64::MAX);
                end.saturating_sub(window_ns)
            }
        };
        check_order(start, end)?;
        Ok((start, end))
    }
}

pub fn normalize_label_query(query: Option<&str>) -> &str {
    match query.map(str::trim) {
        None | Some(EMPTY_MATCHER) => "",
        Some(q) => q,
    }
}

fn required_query(req: &QueryRequest) -> Result<&str> {
    match req.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => Ok(q),
        _ => Err(LokiMcpError::InvalidRequest("query is required".into())),
    }
}

fn check_limit(req: &QueryRequest) -> Result<()> {
    if req.limit == 0 {
        return Err(LokiMcpError::InvalidRequest(
            "limit must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn check_order(start: i64, end: i64) -> Result<()> {
    if start > end {
        return Err(LokiMcpError::InvalidTimeRange { start, end });
    }
    Ok(())
}

fn passthrough_bounds(req: &QueryRequest) -> Result<QueryParams> {
    if let (Some(start), Some(end)) = (req.start, req.end) {
        check_order(start, end)?;
    }
    let mut params = QueryParams::new();
    if let Some(start) = req.start {
        params.insert("start".into(), start.to_string());
    }
    if let Some(end) = req.end {
        params.insert("end".into(), end.to_string());
    }
    Ok(params)
}
