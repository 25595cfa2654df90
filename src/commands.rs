//! Outbound commands the engine sends back to the transport.

use serde_json::{Value, json};

/// Command sent to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Ask the backend to take another reasoning step.
    CreateResponse,
    /// Fetch the full item after an audio buffer commit.
    RetrieveItem { item_id: String },
    /// A user text message typed outside the audio stream. `item_id` pins
    /// the id of the created item when the caller already tracks it.
    UserMessage {
        item_id: Option<String>,
        text: String,
    },
}

impl OutboundCommand {
    /// Wire event type of the command.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateResponse => "response.create",
            Self::RetrieveItem { .. } => "conversation.item.retrieve",
            Self::UserMessage { .. } => "conversation.item.create",
        }
    }

    /// JSON payload as sent on the wire.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::CreateResponse => json!({ "type": self.tag() }),
            Self::RetrieveItem { item_id } => json!({
                "type": self.tag(),
                "item_id": item_id,
            }),
            Self::UserMessage { item_id, text } => {
                let mut item = json!({
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_text", "text": text }],
                });
                if let Some(id) = item_id {
                    item["id"] = json!(id);
                }
                json!({ "type": self.tag(), "item": item })
            }
        }
    }
}
