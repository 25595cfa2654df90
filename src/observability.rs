//! Structured tracing spans and log helpers.
//!
//! Spans follow the hierarchy:
//!
//! ```text
//! relay.session.lifecycle
//!   └─> relay.event.route
//!        └─> relay.tool.lifecycle
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use realtime_relay::event_route_span;
//!
//! let span = event_route_span!("response.created");
//! let _enter = span.enter();
//! ```

// Span names (hierarchical, dot-separated)
/// Span for connect/disconnect transitions.
pub const SPAN_SESSION_LIFECYCLE: &str = "relay.session.lifecycle";

/// Span for routing one inbound event.
pub const SPAN_EVENT_ROUTE: &str = "relay.event.route";

/// Span for a single tool-call lifecycle transition.
pub const SPAN_TOOL_LIFECYCLE: &str = "relay.tool.lifecycle";

// Field keys for span attributes
/// Inbound event tag (e.g. "response.done").
pub const FIELD_TAG: &str = "tag";

/// Transcript item identifier.
pub const FIELD_ITEM_ID: &str = "item_id";

/// Raw tool-call identifier from the transport.
pub const FIELD_RAW_ID: &str = "raw_id";

/// Lifecycle operation ("start", "merge_arguments", "complete", "connect", ...).
pub const FIELD_OPERATION: &str = "operation";

/// Tracing target used for the server-side transcript log.
pub const TRANSCRIPT_LOG_TARGET: &str = "transcript_log";

/// Maximum number of characters kept by [`preview`].
pub const PREVIEW_CHARS: usize = 160;

/// Span for routing one inbound event.
#[macro_export]
macro_rules! event_route_span {
    ($tag:expr) => {
        tracing::debug_span!(
            $crate::observability::SPAN_EVENT_ROUTE,
            { $crate::observability::FIELD_TAG } = $tag,
        )
    };
}

/// Span for a tool-call lifecycle transition.
#[macro_export]
macro_rules! tool_lifecycle_span {
    ($raw_id:expr, $operation:expr) => {
        tracing::debug_span!(
            $crate::observability::SPAN_TOOL_LIFECYCLE,
            { $crate::observability::FIELD_RAW_ID } = $raw_id,
            { $crate::observability::FIELD_OPERATION } = $operation,
        )
    };
}

/// Span for a session lifecycle transition.
#[macro_export]
macro_rules! session_lifecycle_span {
    ($operation:expr) => {
        tracing::info_span!(
            $crate::observability::SPAN_SESSION_LIFECYCLE,
            { $crate::observability::FIELD_OPERATION } = $operation,
        )
    };
}

/// Truncate `text` to [`PREVIEW_CHARS`] characters for log output.
///
/// Longer text keeps its first `PREVIEW_CHARS - 3` characters followed by `…`.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(PREVIEW_CHARS - 3).collect();
    out.push('…');
    out
}
