//! Server-side transcript log.
//!
//! When enabled, finished messages and tool results are forwarded to the
//! [`TRANSCRIPT_LOG_TARGET`] tracing target so a collector can persist them.
//! Messages are deduplicated per item id by their last logged text; tool
//! results are logged once per tool id.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::observability::TRANSCRIPT_LOG_TARGET;
use crate::transcript::types::{ItemId, Role};

/// Deduplicating transcript log sink.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    enabled: bool,
    last_message_text: HashMap<ItemId, String>,
    logged_tools: HashSet<String>,
}

impl TranscriptLog {
    /// Create a sink; a disabled sink records nothing.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Whether the sink forwards anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log a message unless its trimmed text is blank or unchanged.
    ///
    /// Returns `true` when a line was emitted.
    pub fn log_message(&mut self, item_id: &ItemId, role: Role, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.last_message_text.get(item_id).map(String::as_str) == Some(trimmed) {
            return false;
        }
        self.last_message_text
            .insert(item_id.clone(), trimmed.to_owned());
        tracing::info!(
            target: TRANSCRIPT_LOG_TARGET,
            kind = "message",
            item_id = %item_id,
            role = %role,
            text = trimmed,
        );
        true
    }

    /// Log a tool result the first time `tool_id` is seen.
    pub fn log_tool(
        &mut self,
        tool_id: &str,
        tool_name: &str,
        arguments: Option<&Value>,
        output: Option<&Value>,
    ) -> bool {
        if !self.enabled || tool_id.is_empty() {
            return false;
        }
        if !self.logged_tools.insert(tool_id.to_owned()) {
            return false;
        }
        let render = |value: Option<&Value>| value.map(Value::to_string).unwrap_or_default();
        tracing::info!(
            target: TRANSCRIPT_LOG_TARGET,
            kind = "tool",
            tool_id,
            tool_name,
            arguments = %render(arguments),
            output = %render(output),
        );
        true
    }

    /// Log text the user sent outside the audio stream.
    pub fn log_outgoing_user_text(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let synthetic = ItemId::new(format!("outbound-{}", uuid::Uuid::new_v4()));
        self.log_message(&synthetic, Role::User, text)
    }

    /// Forget dedup state.
    pub fn reset(&mut self) {
        self.last_message_text.clear();
        self.logged_tools.clear();
    }
}
