//! Extraction of the hosted image URL from an upload response.
//!
//! Hosting APIs disagree on response shape. Each known shape is a
//! [`ResponseShape`] variant; they are tried in [`ResponseShape::PRIORITY`]
//! order and the first one that yields a URL wins. Anything else, including
//! a body that is not JSON, resolves to `None`.

use reqwest::Url;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"status": <truthy>, "data": {"links": {"url": "..."}}}`
    StatusLinks,
    /// `[{"src": "/relative/path"}, ...]`
    SrcList,
    /// `{"data": {"url": "..."}}`, absolute or relative
    DataUrl,
    /// `{"url": "..."}`
    TopLevelUrl,
}

impl ResponseShape {
    pub const PRIORITY: [ResponseShape; 4] = [
        ResponseShape::StatusLinks,
        ResponseShape::SrcList,
        ResponseShape::DataUrl,
        ResponseShape::TopLevelUrl,
    ];

    /// Extract the URL if `value` has this shape.
    pub fn extract(self, value: &Value, endpoint: &str) -> Option<String> {
        match self {
            ResponseShape::StatusLinks => {
                if !is_truthy(value.get("status")?) {
                    return None;
                }
                value
                    .pointer("/data/links/url")?
                    .as_str()
                    .map(str::to_string)
            }
            ResponseShape::SrcList => {
                let src = value.as_array()?.first()?.get("src")?.as_str()?;
                resolve_against_origin(src, endpoint)
            }
            ResponseShape::DataUrl => {
                let url = value.pointer("/data/url")?.as_str()?;
                if is_absolute_http(url) {
                    Some(url.to_string())
                } else {
                    resolve_against_origin(url, endpoint)
                }
            }
            ResponseShape::TopLevelUrl => {
                value.as_object()?.get("url")?.as_str().map(str::to_string)
            }
        }
    }
}

/// Resolve the hosted image URL from a raw response body.
pub fn interpret(raw_response: &str, endpoint: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(raw_response) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Upload response is not JSON");
            return None;
        }
    };

    let resolved = ResponseShape::PRIORITY
        .iter()
        .find_map(|shape| shape.extract(&value, endpoint).map(|url| (*shape, url)));

    match resolved {
        Some((shape, url)) => {
            tracing::debug!(shape = ?shape, url = %url, "Resolved uploaded image URL");
            Some(url)
        }
        None => {
            tracing::debug!("Upload response matched no known shape");
            None
        }
    }
}

/// Loose truthiness: `null`, `false`, `0` and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_absolute_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolve `reference` against the scheme and host of `endpoint`.
fn resolve_against_origin(reference: &str, endpoint: &str) -> Option<String> {
    let endpoint = Url::parse(endpoint).ok()?;
    let origin = endpoint.join("/").ok()?;
    origin.join(reference).ok().map(String::from)
}
