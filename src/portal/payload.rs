//! Shape matching for portal JSON envelopes
//!
//! Deployments disagree on where the payload lives: `{"js": {"data": ...}}`,
//! `{"js": ...}`, `{"data": ...}` or a bare array/object. Each location is tried in
//! order and the first one the caller's matcher accepts wins.

use serde_json::Value;

/// Body text portals return when a token or signature is rejected
const AUTH_FAILURE_MARKER: &str = "authorization failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    JsData,
    Js,
    RootData,
    Bare,
}

pub const SHAPES: [Shape; 4] = [Shape::JsData, Shape::Js, Shape::RootData, Shape::Bare];

impl Shape {
    pub fn locate<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        match self {
            Shape::JsData => root.get("js")?.get("data"),
            Shape::Js => root.get("js"),
            Shape::RootData => root.get("data"),
            Shape::Bare => Some(root),
        }
    }
}

/// Outcome of interpreting one response body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    AuthFailed,
    /// HTML, XML, empty or otherwise non-JSON; the next candidate should be tried
    Unusable,
}

pub fn classify(text: &str) -> Body {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Body::Unusable;
    }

    if trimmed.to_ascii_lowercase().contains(AUTH_FAILURE_MARKER) {
        return Body::AuthFailed;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Null) => Body::Unusable,
        Ok(value) => Body::Json(value),
        Err(_) => Body::Unusable,
    }
}

/// First shape whose payload satisfies `matcher`
pub fn match_shapes<T>(root: &Value, matcher: impl Fn(&Value) -> Option<T>) -> Option<T> {
    SHAPES
        .iter()
        .find_map(|shape| shape.locate(root).and_then(&matcher))
}

/// String or number field rendered as text; empty strings count as absent
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(text)
}

pub fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty array payload
pub fn non_empty_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array().filter(|items| !items.is_empty())
}
