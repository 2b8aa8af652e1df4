//! Reshapes backend envelopes (`{status, data}`) into tool return values.
//! Missing or mistyped fields become empty containers, never errors.

use serde_json::{Map, Value};

/// `data.result` of a range or instant query.
pub fn results(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(|d| d.get("result"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `data` of a labels or label-values call. Non-string entries are skipped.
pub fn strings(body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Stats are returned as the whole decoded body.
pub fn stats(body: Value) -> Value {
    match body {
        Value::Null => empty_object(),
        other => other,
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}
