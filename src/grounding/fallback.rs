//! Post-stream recovery for replies that ignored the inline marker format.
//!
//! Strategies run in a fixed order and the first `Found` wins. None of them is
//! authoritative; they only catch the shapes models tend to drift into.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::grounding::marker::find_marker;
use crate::grounding::types::{AnswerEvent, BBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found { text: String, bbox: BBox },
    /// A structured reply that answers in words but locates nothing.
    TextOnly(String),
    NotFound,
}

type Strategy = fn(&str) -> Extraction;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("inline_marker", from_marker),
    ("json_object", from_json_object),
    ("embedded_json", from_embedded_json),
];

/// `{ ... "bbox": [..] ... }` with no nested braces.
static OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"bbox"\s*:\s*\[[^\]]*\][^{}]*\}"#).expect("valid object regex")
});

static BBOX_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""bbox"\s*:\s*\[\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*\]"#)
        .expect("valid bbox regex")
});

static TEXT_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""text"\s*:\s*("(?:[^"\\]|\\.)*")"#).expect("valid text regex")
});

/// Runs the strategies in order.
pub fn extract(response: &str) -> Extraction {
    for (name, strategy) in STRATEGIES {
        let found = strategy(response);
        if found != Extraction::NotFound {
            tracing::debug!(strategy = *name, "fallback strategy matched");
            return found;
        }
    }
    Extraction::NotFound
}

/// Whole-reply resolution: the strategies, then the trimmed reply as plain text.
pub fn resolve(response: &str) -> AnswerEvent {
    match extract(response) {
        Extraction::Found { text, bbox } => AnswerEvent::terminal(text, Some(bbox)),
        Extraction::TextOnly(text) => AnswerEvent::terminal(text.trim(), None),
        Extraction::NotFound => AnswerEvent::terminal(response.trim(), None),
    }
}

fn from_marker(response: &str) -> Extraction {
    match find_marker(response) {
        Some(marker) => Extraction::Found {
            text: response[..marker.start].trim().to_string(),
            bbox: marker.bbox,
        },
        None => Extraction::NotFound,
    }
}

fn from_json_object(response: &str) -> Extraction {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(response.trim()) else {
        return Extraction::NotFound;
    };
    let text = obj.get("text").and_then(Value::as_str);
    match (obj.get("bbox").and_then(bbox_from_value), text) {
        (Some(bbox), text) => Extraction::Found {
            text: text.unwrap_or_default().to_string(),
            bbox,
        },
        (None, Some(text)) => Extraction::TextOnly(text.to_string()),
        (None, None) => Extraction::NotFound,
    }
}

fn from_embedded_json(response: &str) -> Extraction {
    let (region, start) = match OBJECT_RE.find(response) {
        Some(m) => (m.as_str(), m.start()),
        None => match BBOX_FIELD_RE.find(response) {
            Some(m) => (m.as_str(), m.start()),
            None => return Extraction::NotFound,
        },
    };

    let Some(bbox) = bbox_from_region(region) else {
        return Extraction::NotFound;
    };
    let text = text_from_region(region)
        .unwrap_or_else(|| trim_leading_fence(&response[..start]).to_string());
    Extraction::Found { text, bbox }
}

fn bbox_from_value(value: &Value) -> Option<BBox> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut coords = [0i64; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item.as_i64()?;
    }
    Some(BBox(coords))
}

fn bbox_from_region(region: &str) -> Option<BBox> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(region) {
        if let Some(bbox) = obj.get("bbox").and_then(bbox_from_value) {
            return Some(bbox);
        }
    }
    let caps = BBOX_FIELD_RE.captures(region)?;
    let mut coords = [0i64; 4];
    for (i, slot) in coords.iter_mut().enumerate() {
        *slot = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Some(BBox(coords))
}

fn text_from_region(region: &str) -> Option<String> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(region) {
        if let Some(text) = obj.get("text").and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    let quoted = TEXT_FIELD_RE.captures(region)?.get(1)?.as_str();
    serde_json::from_str::<String>(quoted).ok()
}

/// Narrative before a ```json fence, without the fence itself.
fn trim_leading_fence(preceding: &str) -> &str {
    let trimmed = preceding.trim_end();
    let trimmed = trimmed.strip_suffix("```json").unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}
