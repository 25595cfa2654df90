//! Transcript store contract and the in-memory implementation.
//!
//! The engine never owns persistence; it drives a [`TranscriptStore`] and
//! reads back the entries it needs to reconcile identifier-less events.

use serde_json::Value;

use super::types::{ItemId, ItemPatch, ItemStatus, Role, TranscriptItem};

/// Placeholder shown for a user utterance that is still being transcribed.
pub const TRANSCRIBING_PLACEHOLDER: &str = "[Transcribing...]";

/// Mutation surface the engine drives.
///
/// Implementations must keep [`items()`](Self::items) in insertion order.
pub trait TranscriptStore {
    /// All entries, oldest first.
    fn items(&self) -> &[TranscriptItem];

    /// Append a message unless a message with this id already exists.
    ///
    /// Returns `false` when the call was a no-op.
    fn add_message(&mut self, item_id: ItemId, role: Role, text: &str, hidden: bool) -> bool;

    /// Append to (`is_delta`) or replace the text of an existing message.
    ///
    /// Returns `false` when no message with this id exists.
    fn update_message(&mut self, item_id: &ItemId, text: &str, is_delta: bool) -> bool;

    /// Append a tool note unless an entry with this id already exists.
    fn add_tool_note(
        &mut self,
        item_id: ItemId,
        tool_name: &str,
        arguments: Option<Value>,
        output: Option<Value>,
        status: ItemStatus,
    ) -> bool;

    /// Append a breadcrumb and return its freshly minted id.
    fn add_breadcrumb(&mut self, label: &str, data: Option<Value>) -> ItemId;

    /// Apply a partial update to every entry with this id.
    ///
    /// Returns `false` when nothing matched.
    fn update_item(&mut self, item_id: &ItemId, patch: &ItemPatch) -> bool;

    /// First entry with this id.
    fn find(&self, item_id: &ItemId) -> Option<&TranscriptItem> {
        self.items().iter().find(|item| item.item_id() == item_id)
    }

    /// The message with this `(item_id, role)` pair.
    fn find_message(&self, item_id: &ItemId, role: Role) -> Option<&TranscriptItem> {
        self.items().iter().find(|item| item.is_message(item_id, role))
    }

    /// Role of the message with this id, regardless of role.
    fn message_role(&self, item_id: &ItemId) -> Option<Role> {
        self.items()
            .iter()
            .filter(|item| item.item_id() == item_id)
            .find_map(TranscriptItem::role)
    }

    /// Newest user message whose status is in `statuses`, scanning back to front.
    fn latest_user_message(&self, statuses: &[ItemStatus]) -> Option<&TranscriptItem> {
        self.items().iter().rev().find(|item| {
            item.role() == Some(Role::User) && statuses.contains(&item.status())
        })
    }
}

/// In-memory transcript backed by a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    items: Vec<TranscriptItem>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the transcript has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Messages only, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &TranscriptItem> {
        self.items
            .iter()
            .filter(|item| matches!(item, TranscriptItem::Message { .. }))
    }

    /// Tool notes only, oldest first.
    pub fn tool_notes(&self) -> impl Iterator<Item = &TranscriptItem> {
        self.items
            .iter()
            .filter(|item| matches!(item, TranscriptItem::ToolNote { .. }))
    }

    /// Breadcrumbs only, oldest first.
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &TranscriptItem> {
        self.items
            .iter()
            .filter(|item| matches!(item, TranscriptItem::Breadcrumb { .. }))
    }
}

impl TranscriptStore for Transcript {
    fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    fn add_message(&mut self, item_id: ItemId, role: Role, text: &str, hidden: bool) -> bool {
        let exists = self
            .items
            .iter()
            .any(|item| matches!(item, TranscriptItem::Message { item_id: id, .. } if *id == item_id));
        if exists {
            tracing::debug!(%item_id, %role, "skipping add_message; message already exists");
            return false;
        }
        self.items.push(TranscriptItem::Message {
            item_id,
            role,
            text: text.to_owned(),
            status: ItemStatus::InProgress,
            hidden,
            guardrail: None,
            created_at_ms: now_ms(),
        });
        true
    }

    fn update_message(&mut self, item_id: &ItemId, new_text: &str, is_delta: bool) -> bool {
        let mut matched = false;
        for item in &mut self.items {
            if let TranscriptItem::Message { item_id: id, text, .. } = item
                && id == item_id
            {
                matched = true;
                if !is_delta || is_placeholder(text) {
                    *text = new_text.to_owned();
                } else {
                    text.push_str(new_text);
                }
            }
        }
        matched
    }

    fn add_tool_note(
        &mut self,
        item_id: ItemId,
        tool_name: &str,
        arguments: Option<Value>,
        output: Option<Value>,
        status: ItemStatus,
    ) -> bool {
        if self.items.iter().any(|item| *item.item_id() == item_id) {
            return false;
        }
        self.items.push(TranscriptItem::ToolNote {
            item_id,
            tool_name: tool_name.to_owned(),
            status,
            arguments,
            output,
            created_at_ms: now_ms(),
        });
        true
    }

    fn add_breadcrumb(&mut self, label: &str, data: Option<Value>) -> ItemId {
        let item_id = ItemId::new(format!("breadcrumb-{}", uuid::Uuid::new_v4()));
        self.items.push(TranscriptItem::Breadcrumb {
            item_id: item_id.clone(),
            label: label.to_owned(),
            data,
            created_at_ms: now_ms(),
        });
        item_id
    }

    fn update_item(&mut self, item_id: &ItemId, patch: &ItemPatch) -> bool {
        let mut matched = false;
        for item in self.items.iter_mut().filter(|item| item.item_id() == item_id) {
            item.apply(patch);
            matched = true;
        }
        matched
    }
}

/// Whether `text` is empty or a "still transcribing" placeholder that a
/// streamed delta should replace rather than extend.
pub fn is_placeholder(text: &str) -> bool {
    let normalized = text.replace('\u{2026}', "...").trim().to_lowercase();
    normalized.is_empty() || normalized == "[transcribing...]" || normalized == "..."
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn add_message_is_idempotent_per_item_id() {
        let mut t = Transcript::new();
        assert!(t.add_message("m1".into(), Role::User, "hi", false));
        assert!(!t.add_message("m1".into(), Role::User, "again", false));
        assert!(!t.add_message("m1".into(), Role::Assistant, "other", false));
        assert_eq!(t.len(), 1);
        assert_eq!(t.items()[0].text(), Some("hi"));
    }

    #[test]
    fn delta_appends_and_snapshot_replaces() {
        let mut t = Transcript::new();
        t.add_message("m1".into(), Role::Assistant, "Hel", false);
        assert!(t.update_message(&"m1".into(), "lo", true));
        assert_eq!(t.items()[0].text(), Some("Hello"));
        assert!(t.update_message(&"m1".into(), "Goodbye", false));
        assert_eq!(t.items()[0].text(), Some("Goodbye"));
    }

    #[test]
    fn delta_replaces_placeholder() {
        let mut t = Transcript::new();
        t.add_message("m1".into(), Role::User, TRANSCRIBING_PLACEHOLDER, false);
        t.update_message(&"m1".into(), "what is", true);
        assert_eq!(t.items()[0].text(), Some("what is"));
        t.update_message(&"m1".into(), " my balance", true);
        assert_eq!(t.items()[0].text(), Some("what is my balance"));
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("  "));
        assert!(is_placeholder("[Transcribing...]"));
        assert!(is_placeholder("[transcribing\u{2026}]"));
        assert!(is_placeholder("\u{2026}"));
        assert!(is_placeholder("..."));
        assert!(!is_placeholder("hello..."));
    }

    #[test]
    fn update_unknown_message_reports_no_match() {
        let mut t = Transcript::new();
        assert!(!t.update_message(&"missing".into(), "x", true));
        assert!(t.is_empty());
    }

    #[test]
    fn tool_note_ids_are_unique() {
        let mut t = Transcript::new();
        assert!(t.add_tool_note("tool-a1".into(), "resolve_wallet", None, None, ItemStatus::InProgress));
        assert!(!t.add_tool_note("tool-a1".into(), "resolve_wallet", None, None, ItemStatus::Done));
        assert_eq!(t.tool_notes().count(), 1);
    }

    #[test]
    fn breadcrumbs_get_unique_ids() {
        let mut t = Transcript::new();
        let a = t.add_breadcrumb("one", None);
        let b = t.add_breadcrumb("two", Some(json!({"k": 1})));
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("breadcrumb-"));
        assert_eq!(t.breadcrumbs().count(), 2);
    }

    #[test]
    fn latest_user_message_scans_back_to_front() {
        let mut t = Transcript::new();
        t.add_message("u1".into(), Role::User, "first", false);
        t.add_message("a1".into(), Role::Assistant, "reply", false);
        t.add_message("u2".into(), Role::User, "second", false);
        t.update_item(&"u2".into(), &ItemPatch::status(ItemStatus::Done));

        let in_progress = t.latest_user_message(&[ItemStatus::InProgress]).unwrap();
        assert_eq!(in_progress.item_id().as_str(), "u1");

        let any = t
            .latest_user_message(&[ItemStatus::InProgress, ItemStatus::Done])
            .unwrap();
        assert_eq!(any.item_id().as_str(), "u2");
    }

    #[test]
    fn message_role_lookup() {
        let mut t = Transcript::new();
        t.add_message("a1".into(), Role::Assistant, "", false);
        assert_eq!(t.message_role(&"a1".into()), Some(Role::Assistant));
        assert_eq!(t.message_role(&"nope".into()), None);
    }
}
