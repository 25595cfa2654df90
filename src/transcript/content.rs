//! Payload helpers: display text extraction, opportunistic JSON parsing,
//! guardrail notice detection.

use serde_json::Value;

use crate::events::{ContentPart, TranscriptionPayload};
use crate::observability::preview;

/// Text substituted for an image part.
pub const IMAGE_ATTACHMENT_TEXT: &str = "[Image attachment]";

/// Final transcript used when a completion carries no usable text.
pub const INAUDIBLE_TEXT: &str = "[inaudible]";

const GUARDRAIL_MARKER: &str = "Failure Details: ";

/// Display text of a message's content list.
///
/// Each part contributes at most one string; empty contributions are
/// skipped and the rest joined with newlines in order.
pub fn extract_message_text(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter_map(|part| {
            let text = match part.kind.as_str() {
                "input_text" | "text" | "output_text" => part.text.as_deref(),
                "audio" | "input_audio" => part.transcript.as_deref(),
                "input_image" => Some(IMAGE_ATTACHMENT_TEXT),
                _ => None,
            }?;
            (!text.is_empty()).then_some(text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse raw text as JSON when it looks like an object or array.
///
/// Non-string values pass through unchanged. Blank strings become `None`.
/// Text that fails to parse is preserved as a string and logged.
pub fn maybe_parse_json(value: &Value) -> Option<Value> {
    let Value::String(raw) = value else {
        return Some(value.clone());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Some(value.clone());
    }
    match serde_json::from_str(trimmed) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(preview = %preview(trimmed), error = %e, "failed to parse JSON payload");
            Some(value.clone())
        }
    }
}

/// Whether a payload has anything worth rendering.
pub fn has_renderable_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Parse an optional raw payload and keep it only if renderable.
pub fn renderable(value: Option<&Value>) -> Option<Value> {
    value
        .and_then(maybe_parse_json)
        .filter(has_renderable_content)
}

/// Find the JSON blob embedded in a guardrail-failure notice.
///
/// The notice is a system-injected corrective instruction of the form
/// `... Failure Details: {...} ...`. The blob ends at the first `}` on the
/// same line.
pub fn detect_guardrail_notice(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(GUARDRAIL_MARKER) {
        let start = search_from + offset + GUARDRAIL_MARKER.len();
        let rest = &text[start..];
        if rest.starts_with('{') {
            let line_end = rest.find('\n').unwrap_or(rest.len());
            if let Some(close) = rest[..line_end].find('}') {
                return Some(&rest[..=close]);
            }
        }
        search_from = start;
    }
    None
}

/// Moderation details extracted from a guardrail output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moderation {
    pub category: String,
    pub rationale: String,
    pub test_text: Option<String>,
}

/// Descend through `outputInfo` / `output` / `result` until an object with
/// `moderationCategory` is found.
pub fn extract_moderation(value: &Value) -> Option<Moderation> {
    let object = value.as_object()?;
    if object.contains_key("moderationCategory") {
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
        return Some(Moderation {
            category: text("moderationCategory").unwrap_or_else(|| "NONE".to_owned()),
            rationale: text("moderationRationale").unwrap_or_default(),
            test_text: text("testText"),
        });
    }
    ["outputInfo", "output", "result"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(extract_moderation)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Target id of a delta event: `item_id`, `item.id`, `id`, `message_id`, `response_id`.
pub fn delta_target_id(payload: &TranscriptionPayload) -> Option<&str> {
    non_empty(payload.item_id.as_deref())
        .or_else(|| non_empty(payload.item.as_ref().and_then(|i| i.id.as_deref())))
        .or_else(|| non_empty(payload.id.as_deref()))
        .or_else(|| non_empty(payload.message_id.as_deref()))
        .or_else(|| non_empty(payload.response_id.as_deref()))
}

/// Target id of a completion event: `item_id`, `id`, `message_id`.
pub fn completion_target_id(payload: &TranscriptionPayload) -> Option<&str> {
    non_empty(payload.item_id.as_deref())
        .or_else(|| non_empty(payload.id.as_deref()))
        .or_else(|| non_empty(payload.message_id.as_deref()))
}

/// Text fragment of a delta event. Empty when the event carries none.
pub fn delta_text(payload: &TranscriptionPayload) -> &str {
    if let Some(text) = payload
        .delta
        .as_deref()
        .or(payload.transcript.as_deref())
        .or_else(|| payload.item.as_ref().and_then(|i| i.delta.as_deref()))
        .or_else(|| payload.item.as_ref().and_then(|i| i.transcript.as_deref()))
    {
        return text;
    }
    payload
        .content
        .iter()
        .find_map(|part| {
            part.delta
                .as_deref()
                .or(part.text.as_deref())
                .or(part.transcript.as_deref())
        })
        .unwrap_or("")
}

/// Final text of a completion event.
///
/// A non-blank `transcript` wins, then the first non-blank audio content
/// transcript, then [`INAUDIBLE_TEXT`].
pub fn completion_text(payload: &TranscriptionPayload) -> &str {
    if let Some(transcript) = payload.transcript.as_deref()
        && !transcript.trim().is_empty()
    {
        return transcript;
    }
    payload
        .content
        .iter()
        .filter(|part| part.kind == "input_audio" || part.kind == "audio")
        .filter_map(|part| part.transcript.as_deref())
        .find(|t| !t.trim().is_empty())
        .unwrap_or(INAUDIBLE_TEXT)
}

/// Role-resolution fallback for events that do not say which side spoke:
/// a response id or output index implies the assistant.
pub fn implies_assistant(payload: &TranscriptionPayload) -> bool {
    payload.response_id.is_some() || payload.output_index.is_some()
}
