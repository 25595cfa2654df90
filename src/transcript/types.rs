//! Transcript data model.
//!
//! A transcript is an ordered, append-only list of [`TranscriptItem`]s.
//! Entries are mutated in place as streaming events arrive; they are only
//! removed when the whole transcript is cleared.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a transcript entry.
///
/// Either supplied by the transport or synthesized by
/// [`IdentitySynthesizer`](crate::identity::IdentitySynthesizer) when the
/// event carried none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parse a wire role string. Only `user` and `assistant` are recognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    InProgress,
    Done,
}

/// Moderation outcome attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// `InProgress` while the check is still running.
    pub status: ItemStatus,
    /// Moderation category (`NONE` when the check passed).
    pub category: String,
    /// Free-form explanation from the moderation check.
    pub rationale: String,
    /// The text that was tested, when the check reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_text: Option<String>,
}

impl GuardrailResult {
    /// A check that has started but not reported.
    pub fn pending() -> Self {
        Self {
            status: ItemStatus::InProgress,
            category: String::new(),
            rationale: String::new(),
            test_text: None,
        }
    }

    /// The neutral pass state.
    pub fn passed() -> Self {
        Self {
            status: ItemStatus::Done,
            category: "NONE".to_owned(),
            rationale: String::new(),
            test_text: None,
        }
    }

    /// Whether the check is still outstanding.
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::InProgress
    }
}

/// One entry in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptItem {
    /// A user or assistant utterance.
    Message {
        item_id: ItemId,
        role: Role,
        text: String,
        status: ItemStatus,
        /// Hidden messages are kept for context but not rendered.
        hidden: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guardrail: Option<GuardrailResult>,
        created_at_ms: i64,
    },
    /// A tool invocation accumulating arguments then output.
    ToolNote {
        item_id: ItemId,
        tool_name: String,
        status: ItemStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        created_at_ms: i64,
    },
    /// Out-of-band annotation (guardrail notice, debug marker).
    Breadcrumb {
        item_id: ItemId,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        created_at_ms: i64,
    },
}

impl TranscriptItem {
    /// Identifier of the entry.
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::Message { item_id, .. }
            | Self::ToolNote { item_id, .. }
            | Self::Breadcrumb { item_id, .. } => item_id,
        }
    }

    /// Status of the entry. Breadcrumbs are always `Done`.
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Message { status, .. } | Self::ToolNote { status, .. } => *status,
            Self::Breadcrumb { .. } => ItemStatus::Done,
        }
    }

    /// Role of a message entry; `None` for tool notes and breadcrumbs.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Whether this is a message with the given id and role.
    pub fn is_message(&self, id: &ItemId, wanted: Role) -> bool {
        matches!(self, Self::Message { item_id, role, .. } if item_id == id && *role == wanted)
    }

    /// Message text, if this is a message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Apply a partial update. Fields that do not exist on this variant are ignored.
    pub fn apply(&mut self, patch: &ItemPatch) {
        match self {
            Self::Message {
                status, guardrail, ..
            } => {
                if let Some(next) = patch.status {
                    *status = next;
                }
                if let Some(next) = &patch.guardrail {
                    *guardrail = Some(next.clone());
                }
            }
            Self::ToolNote {
                tool_name,
                status,
                arguments,
                output,
                ..
            } => {
                if let Some(next) = patch.status {
                    *status = next;
                }
                if let Some(next) = &patch.tool_name
                    && !next.is_empty()
                {
                    *tool_name = next.clone();
                }
                if let Some(next) = &patch.arguments {
                    *arguments = Some(next.clone());
                }
                if let Some(next) = &patch.output {
                    *output = Some(next.clone());
                }
            }
            Self::Breadcrumb { .. } => {}
        }
    }
}

/// Partial update for [`TranscriptStore::update_item`](super::store::TranscriptStore::update_item).
///
/// `None` fields leave the existing value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub tool_name: Option<String>,
    pub arguments: Option<Value>,
    pub output: Option<Value>,
    pub guardrail: Option<GuardrailResult>,
}

impl ItemPatch {
    /// Patch that only changes the status.
    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that only sets the guardrail result.
    pub fn guardrail(result: GuardrailResult) -> Self {
        Self {
            guardrail: Some(result),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn message(id: &str, role: Role) -> TranscriptItem {
        TranscriptItem::Message {
            item_id: id.into(),
            role,
            text: String::new(),
            status: ItemStatus::InProgress,
            hidden: false,
            guardrail: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn role_parse_accepts_only_known_roles() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let value = serde_json::to_value(message("m1", Role::User)).unwrap();
        assert_eq!(value["type"], "MESSAGE");
        assert_eq!(value["item_id"], "m1");
        assert_eq!(value["role"], "user");
        assert_eq!(value["status"], "IN_PROGRESS");
        assert!(value.get("guardrail").is_none());
    }

    #[test]
    fn is_message_matches_id_and_role() {
        let item = message("m1", Role::User);
        assert!(item.is_message(&"m1".into(), Role::User));
        assert!(!item.is_message(&"m1".into(), Role::Assistant));
        assert!(!item.is_message(&"m2".into(), Role::User));
    }

    #[test]
    fn patch_updates_tool_note_fields() {
        let mut note = TranscriptItem::ToolNote {
            item_id: "tool-a1".into(),
            tool_name: "resolve_wallet".into(),
            status: ItemStatus::InProgress,
            arguments: None,
            output: None,
            created_at_ms: 0,
        };
        note.apply(&ItemPatch {
            status: Some(ItemStatus::Done),
            tool_name: Some(String::new()),
            output: Some(json!({"ok": true})),
            ..ItemPatch::default()
        });
        match note {
            TranscriptItem::ToolNote {
                tool_name,
                status,
                output,
                ..
            } => {
                // An empty name never clobbers a known one.
                assert_eq!(tool_name, "resolve_wallet");
                assert_eq!(status, ItemStatus::Done);
                assert_eq!(output, Some(json!({"ok": true})));
            }
            other => unreachable!("expected ToolNote, got {other:?}"),
        }
    }

    #[test]
    fn patch_ignores_breadcrumbs() {
        let mut crumb = TranscriptItem::Breadcrumb {
            item_id: "breadcrumb-1".into(),
            label: "note".into(),
            data: None,
            created_at_ms: 0,
        };
        let before = crumb.clone();
        crumb.apply(&ItemPatch::status(ItemStatus::InProgress));
        assert_eq!(crumb, before);
        assert_eq!(crumb.status(), ItemStatus::Done);
    }

    #[test]
    fn guardrail_constructors() {
        assert!(GuardrailResult::pending().is_pending());
        let passed = GuardrailResult::passed();
        assert!(!passed.is_pending());
        assert_eq!(passed.category, "NONE");
    }
}
