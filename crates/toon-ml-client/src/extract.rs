//! Extraction of the output image reference from a prediction.
//!
//! The `output` field of a prediction has taken several shapes over time:
//! a bare URL, a list of URLs, an object keyed by `url`/`image`/..., or a
//! file object nesting its links. The strategies below are tried in
//! order; each may recurse through the whole list for nested values.

use serde_json::Value;
use tracing::debug;

use crate::error::{MlError, MlResult};

type Strategy = fn(&Value) -> Option<String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("plain_string", plain_string),
    ("known_key", known_key),
    ("first_element", first_element),
    ("link_container", link_container),
];

/// Keys that directly hold a link.
const KNOWN_KEYS: &[&str] = &["url", "output", "image", "file", "result"];

/// Keys that hold a link or a structure containing one.
const LINK_KEYS: &[&str] = &["url", "get", "download_url", "uri"];

/// Pull a downloadable reference (http(s) URL or `data:` URI) out of a
/// prediction's `output`.
pub fn extract_output_reference(output: &Value) -> MlResult<String> {
    if is_empty(output) {
        return Err(MlError::EmptyOutput);
    }
    find_reference(output).ok_or_else(|| MlError::UnusableOutput {
        raw: output.to_string(),
    })
}

fn find_reference(value: &Value) -> Option<String> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(value);
        if found.is_some() {
            debug!(strategy = *name, "Extracted output reference");
        }
        found
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn is_link(s: &str) -> bool {
    s.starts_with("http") || s.starts_with("data:")
}

fn plain_string(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn known_key(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    KNOWN_KEYS
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| is_link(s))
        .map(str::to_string)
}

fn first_element(value: &Value) -> Option<String> {
    value.as_array()?.first().and_then(find_reference)
}

fn link_container(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    LINK_KEYS.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::String(s) if is_link(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => find_reference(v),
        _ => None,
    })
}
