//! Inbound event vocabulary.
//!
//! [`TransportEvent`] is the closed set of wire tags the engine understands.
//! [`decode`] is the thin boundary that turns a raw JSON object into one; any
//! tag outside the vocabulary (or a known tag with an unusable payload)
//! becomes [`TransportEvent::Unknown`] and is dropped by the router.
//!
//! [`InboundEvent`] wraps transport events together with the session-level
//! callbacks raised by the realtime client library (history, guardrail,
//! agent tool, handoff), so the whole engine is fed from one stream.
//!
//! # Examples
//!
//! ```
//! use realtime_relay::events::{decode, TransportEvent};
//!
//! let event = decode(serde_json::json!({
//!     "type": "response.created",
//!     "response": { "id": "resp_1" }
//! }))
//! .unwrap();
//! assert_eq!(event.tag(), "response.created");
//! assert!(matches!(event, TransportEvent::ResponseCreated(_)));
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Item kind carried by MCP tool invocations.
pub const MCP_CALL_KIND: &str = "mcp_call";

/// Item kind carried by conversation messages.
pub const MESSAGE_KIND: &str = "message";

/// One element of a message's `content` list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentPart {
    /// Part kind (`input_text`, `audio`, `input_audio`, `input_image`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    pub transcript: Option<String>,
    pub delta: Option<String>,
}

/// A conversation item as carried by `conversation.item.*` and
/// `response.output_item.*` events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversationItem {
    #[serde(alias = "itemId")]
    pub id: Option<String>,
    /// Call id some tool items carry instead of `id`.
    pub call_id: Option<String>,
    /// Item kind (`message`, `mcp_call`, `function_call`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Option<String>,
    pub content: Vec<ContentPart>,
    pub name: Option<String>,
    /// Raw arguments; usually a JSON-encoded string.
    pub arguments: Option<Value>,
    /// Raw output; usually a JSON-encoded string.
    pub output: Option<Value>,
    pub status: Option<String>,
}

impl ConversationItem {
    /// Whether this item is a conversation message.
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_KIND
    }

    /// Whether this item is an MCP tool invocation.
    pub fn is_tool_call(&self) -> bool {
        self.kind == MCP_CALL_KIND
    }

    /// Identifier, ignoring blank values.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// Raw tool-call id: `id`, falling back to `call_id`.
    pub fn tool_call_id(&self) -> Option<&str> {
        self.id().or_else(|| {
            self.call_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
        })
    }
}

/// Nested `item` reference some transcription events carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NestedItemRef {
    pub id: Option<String>,
    pub delta: Option<String>,
    pub transcript: Option<String>,
}

/// Payload shared by every transcription delta/completion event.
///
/// The transport is inconsistent about where it puts the item id and the
/// text, so every known location is kept and resolved by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionPayload {
    pub item_id: Option<String>,
    pub item: Option<NestedItemRef>,
    pub id: Option<String>,
    pub message_id: Option<String>,
    pub response_id: Option<String>,
    pub output_index: Option<u64>,
    pub role: Option<String>,
    pub delta: Option<String>,
    pub transcript: Option<String>,
    pub content: Vec<ContentPart>,
}

/// Envelope for events whose payload is a single conversation item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemEnvelope {
    pub item: Option<ConversationItem>,
}

/// Envelope for events that carry only an item id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemIdEnvelope {
    pub item_id: Option<String>,
}

/// Payload of `response.mcp_call_arguments.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArgumentsDone {
    pub item_id: Option<String>,
    pub arguments: Option<String>,
}

/// The `response` object carried by `response.created` / `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponsePayload {
    pub id: Option<String>,
    pub status: Option<String>,
    pub output: Vec<ConversationItem>,
    pub usage: Option<Value>,
}

impl ResponsePayload {
    /// Whether the step produced a final assistant message.
    pub fn has_assistant_message(&self) -> bool {
        self.output.iter().any(ConversationItem::is_message)
    }

    /// Whether the step spawned any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.output.iter().any(ConversationItem::is_tool_call)
    }
}

/// Envelope for `response.created` / `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseEnvelope {
    pub response: Option<ResponsePayload>,
}

/// Empty payload for events that carry nothing the engine reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Marker {}

/// Closed set of transport events, one variant per wire tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TransportEvent {
    #[serde(rename = "response.created")]
    ResponseCreated(ResponseEnvelope),
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded(ItemEnvelope),
    #[serde(rename = "response.output_item.done")]
    OutputItemDone(ItemEnvelope),
    #[serde(rename = "response.mcp_call.completed")]
    McpCallCompleted(ItemIdEnvelope),
    #[serde(rename = "response.mcp_call_arguments.done")]
    McpCallArgumentsDone(ArgumentsDone),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseEnvelope),
    #[serde(rename = "conversation.item.created")]
    ItemCreated(ItemEnvelope),
    #[serde(rename = "conversation.item.retrieved")]
    ItemRetrieved(ItemEnvelope),
    #[serde(
        rename = "conversation.item.input_audio_transcription.delta",
        alias = "input_audio_transcription.delta"
    )]
    InputTranscriptionDelta(TranscriptionPayload),
    #[serde(
        rename = "conversation.item.input_audio_transcription.completed",
        alias = "input_audio_transcription.completed"
    )]
    InputTranscriptionCompleted(TranscriptionPayload),
    #[serde(
        rename = "conversation.item.input_audio_transcription.done",
        alias = "input_audio_transcription.done"
    )]
    InputTranscriptionDone(TranscriptionPayload),
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted(ItemIdEnvelope),
    #[serde(rename = "input_audio_buffer.committed")]
    BufferCommitted(ItemIdEnvelope),
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped(Marker),
    #[serde(rename = "response.audio_transcript.delta")]
    AssistantTranscriptDelta(TranscriptionPayload),
    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscriptDone(TranscriptionPayload),
    /// A tag outside the vocabulary. Logged and dropped.
    #[serde(skip)]
    Unknown {
        tag: String,
    },
}

impl TransportEvent {
    /// Canonical wire tag of this event.
    pub fn tag(&self) -> &str {
        match self {
            Self::ResponseCreated(_) => "response.created",
            Self::OutputItemAdded(_) => "response.output_item.added",
            Self::OutputItemDone(_) => "response.output_item.done",
            Self::McpCallCompleted(_) => "response.mcp_call.completed",
            Self::McpCallArgumentsDone(_) => "response.mcp_call_arguments.done",
            Self::ResponseDone(_) => "response.done",
            Self::ItemCreated(_) => "conversation.item.created",
            Self::ItemRetrieved(_) => "conversation.item.retrieved",
            Self::InputTranscriptionDelta(_) => {
                "conversation.item.input_audio_transcription.delta"
            }
            Self::InputTranscriptionCompleted(_) => {
                "conversation.item.input_audio_transcription.completed"
            }
            Self::InputTranscriptionDone(_) => "conversation.item.input_audio_transcription.done",
            Self::SpeechStarted(_) => "input_audio_buffer.speech_started",
            Self::BufferCommitted(_) => "input_audio_buffer.committed",
            Self::SpeechStopped(_) => "input_audio_buffer.speech_stopped",
            Self::AssistantTranscriptDelta(_) => "response.audio_transcript.delta",
            Self::AssistantTranscriptDone(_) => "response.audio_transcript.done",
            Self::Unknown { tag } => tag,
        }
    }
}

/// Decode one raw transport event.
///
/// # Errors
///
/// Returns [`RelayError::Decode`] only when the payload has no string `type`
/// tag at all. Unrecognized tags and known tags with malformed payloads
/// decode to [`TransportEvent::Unknown`].
pub fn decode(raw: Value) -> Result<TransportEvent> {
    let Some(tag) = raw.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Err(RelayError::Decode(
            "transport event has no string `type` tag".into(),
        ));
    };
    match serde_json::from_value::<TransportEvent>(raw) {
        Ok(event) => Ok(event),
        Err(e) => {
            if is_known_tag(&tag) {
                tracing::warn!(%tag, error = %e, "malformed transport event payload; dropping");
            }
            Ok(TransportEvent::Unknown { tag })
        }
    }
}

/// Decode one newline-delimited JSON line.
///
/// # Errors
///
/// Returns [`RelayError::Decode`] if the line is not JSON or has no `type` tag.
pub fn decode_line(line: &str) -> Result<TransportEvent> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| RelayError::Decode(format!("invalid JSON line: {e}")))?;
    decode(value)
}

/// Whether `tag` is part of the wire vocabulary (including aliases).
pub fn is_known_tag(tag: &str) -> bool {
    KNOWN_TAGS.contains(&tag)
}

pub const KNOWN_TAGS: &[&str] = &[
    "response.created",
    "response.output_item.added",
    "response.output_item.done",
    "response.mcp_call.completed",
    "response.mcp_call_arguments.done",
    "response.done",
    "conversation.item.created",
    "conversation.item.retrieved",
    "conversation.item.input_audio_transcription.delta",
    "conversation.item.input_audio_transcription.completed",
    "conversation.item.input_audio_transcription.done",
    "input_audio_transcription.delta",
    "input_audio_transcription.completed",
    "input_audio_transcription.done",
    "input_audio_buffer.speech_started",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
];

/// Everything the engine consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A raw transport event.
    Transport(TransportEvent),
    /// The client library appended an item to its history.
    HistoryAdded(ConversationItem),
    /// The client library refreshed items already in its history.
    HistoryUpdated(Vec<ConversationItem>),
    /// An output guardrail tripped.
    GuardrailTripped {
        /// Conversation history at the time of the trip.
        history: Vec<ConversationItem>,
        /// The guardrail's raw output object.
        output: Value,
    },
    /// The client library finished an MCP tool call.
    McpToolCallCompleted(ConversationItem),
    /// A locally executed function tool started.
    AgentToolStart {
        call_id: String,
        name: String,
        arguments: Option<Value>,
    },
    /// A locally executed function tool finished.
    AgentToolEnd {
        call_id: String,
        name: String,
        result: Option<Value>,
    },
    /// Control moved to another agent.
    AgentHandoff {
        /// Name of the agent that took over, when the library reported it.
        to_agent: Option<String>,
        /// Conversation history, used to infer the target on older libraries.
        history: Vec<ConversationItem>,
    },
    /// The session reported an error.
    Error(Value),
}

impl InboundEvent {
    /// Tag used for tracing.
    pub fn tag(&self) -> &str {
        match self {
            Self::Transport(event) => event.tag(),
            Self::HistoryAdded(_) => "history_added",
            Self::HistoryUpdated(_) => "history_updated",
            Self::GuardrailTripped { .. } => "guardrail_tripped",
            Self::McpToolCallCompleted(_) => "mcp_tool_call_completed",
            Self::AgentToolStart { .. } => "agent_tool_start",
            Self::AgentToolEnd { .. } => "agent_tool_end",
            Self::AgentHandoff { .. } => "agent_handoff",
            Self::Error(_) => "error",
        }
    }
}

impl From<TransportEvent> for InboundEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}
