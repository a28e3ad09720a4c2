//! Text extraction from provider JSON of varying shape.
//!
//! Each extraction rule is a plain function over [`serde_json::Value`];
//! rule lists are tried in order and the first non-empty string wins.

use serde_json::{json, Value};

use crate::error::ChatError;

type Extractor = fn(&Value) -> Option<&str>;

fn non_empty(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn delta_content(v: &Value) -> Option<&str> {
    non_empty(v.pointer("/choices/0/delta/content"))
}

fn message_content(v: &Value) -> Option<&str> {
    non_empty(v.pointer("/choices/0/message/content"))
}

fn first_output(v: &Value) -> Option<&str> {
    non_empty(v.pointer("/outputs/0"))
}

fn flat_text(v: &Value) -> Option<&str> {
    non_empty(v.get("text"))
}

fn flat_content(v: &Value) -> Option<&str> {
    non_empty(v.get("content"))
}

/// Rules for one incremental stream frame.
const FRAME_RULES: &[Extractor] = &[delta_content, flat_text, flat_content];

/// Rules for a whole response body.
const BODY_RULES: &[Extractor] = &[message_content, first_output, flat_text, flat_content];

fn first_match<'a>(value: &'a Value, rules: &[Extractor]) -> Option<&'a str> {
    rules.iter().find_map(|rule| rule(value))
}

/// A single-element (or longer) array yields its first element.
pub fn unwrap_single(value: &Value) -> &Value {
    match value {
        Value::Array(items) if !items.is_empty() => &items[0],
        other => other,
    }
}

/// Delta carried by one parsed stream frame, if any.
pub fn frame_delta(frame: &Value) -> Option<&str> {
    first_match(frame, FRAME_RULES)
}

/// Text of a whole body, tolerating a wrapping array. `None` when no rule
/// matches.
pub fn body_text(body: &Value) -> Option<&str> {
    first_match(unwrap_single(body), BODY_RULES)
}

/// Text of a non-streaming completion body. No match is a hard error.
pub fn extract_completion_text(body: &Value) -> Result<String, ChatError> {
    body_text(body).map(str::to_string).ok_or_else(|| {
        let preview: String = body.to_string().chars().take(200).collect();
        ChatError::InvalidResponse(format!("no completion text in response: {}", preview))
    })
}

/// Unwrap a Vertex-style `predictions` envelope into an OpenAI-shaped body.
///
/// Bodies without `predictions` are returned untouched. A prediction already
/// carrying `choices[0].message` is passed through; a plain object has its
/// `text`/`content` wrapped; anything else is stringified and wrapped.
pub fn normalize_prediction_body(body: Value) -> Value {
    let prediction = match body.get("predictions") {
        Some(Value::Array(items)) => items.first().cloned(),
        Some(other) => Some(other.clone()),
        None => None,
    };
    let Some(prediction) = prediction.filter(|p| !p.is_null()) else {
        return body;
    };
    let prediction = unwrap_single(&prediction).clone();

    if prediction.pointer("/choices/0/message").is_some() {
        return prediction;
    }

    let content = match &prediction {
        Value::Object(_) => flat_text(&prediction)
            .or_else(|| flat_content(&prediction))
            .map(str::to_string)
            .unwrap_or_else(|| prediction.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    assistant_body(&content)
}

/// OpenAI-shaped body carrying one assistant message.
pub fn assistant_body(content: &str) -> Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": content }
        }]
    })
}
