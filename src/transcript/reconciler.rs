//! Folds message and transcription events into the transcript.
//!
//! Every operation is idempotent with respect to message identity: a
//! message is created at most once per item id and afterwards only mutated
//! in place. Events that omit the item id are attached by heuristic to the
//! newest user utterance still being transcribed.

use serde_json::{Value, json};

use super::content::{
    INAUDIBLE_TEXT, completion_target_id, completion_text, delta_target_id, delta_text,
    detect_guardrail_notice, extract_message_text, extract_moderation, implies_assistant,
};
use super::log::TranscriptLog;
use super::store::{TRANSCRIBING_PLACEHOLDER, TranscriptStore};
use super::types::{GuardrailResult, ItemId, ItemPatch, ItemStatus, Role, TranscriptItem};
use crate::events::{ContentPart, ConversationItem, TranscriptionPayload};
use crate::observability::preview;

/// Label of the breadcrumb recorded in place of a guardrail notice.
pub const GUARDRAIL_BREADCRUMB_LABEL: &str = "Output Guardrail Active";

/// Which side of the conversation a transcription event is expected to
/// belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleHint {
    User,
    Assistant,
    /// Infer from the event's `role`, then the existing message, then the
    /// response-id heuristic.
    Auto,
}

/// Applies add/update/delta/complete operations to a [`TranscriptStore`].
#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    debug_transcript: bool,
    log: TranscriptLog,
}

impl TranscriptReconciler {
    pub fn new(debug_transcript: bool, log_server_side: bool) -> Self {
        Self {
            debug_transcript,
            log: TranscriptLog::new(log_server_side),
        }
    }

    // ── Whole messages ───────────────────────────────────────

    /// Add a message item reported by the client history.
    ///
    /// Non-message items and items without an id or a known role are ignored.
    pub fn history_added<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        item: &ConversationItem,
    ) -> bool {
        if !item.is_message() {
            return false;
        }
        let (Some(item_id), Some(role)) = (item.id(), item.role.as_deref().and_then(Role::parse))
        else {
            return false;
        };
        self.add_message(store, ItemId::new(item_id), role, &item.content)
    }

    /// Add a message from its content list.
    ///
    /// An empty user message gets the transcribing placeholder. Text that
    /// carries a guardrail failure notice is recorded as a breadcrumb and
    /// never becomes a message. Returns `true` when a message was added.
    pub fn add_message<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        item_id: ItemId,
        role: Role,
        content: &[ContentPart],
    ) -> bool {
        let mut text = extract_message_text(content);
        if role == Role::User && text.is_empty() {
            text = TRANSCRIBING_PLACEHOLDER.to_owned();
        }
        if self.debug_transcript {
            tracing::debug!(%item_id, %role, text = %preview(&text), "history_added");
        }

        if let Some(blob) = detect_guardrail_notice(&text) {
            let details = serde_json::from_str::<Value>(blob).unwrap_or_else(|e| {
                tracing::warn!(preview = %preview(blob), error = %e, "guardrail details are not valid JSON");
                Value::String(blob.to_owned())
            });
            store.add_breadcrumb(GUARDRAIL_BREADCRUMB_LABEL, Some(json!({ "details": details })));
            return false;
        }

        let added = store.add_message(item_id.clone(), role, &text, false);
        if added {
            self.log.log_message(&item_id, role, &text);
        }
        added
    }

    /// Add a user message that is kept for context but not rendered.
    pub fn add_hidden_user_message<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        item_id: ItemId,
        text: &str,
    ) -> bool {
        store.add_message(item_id, Role::User, text, true)
    }

    /// Replace the text of refreshed history messages that carry text.
    pub fn history_updated<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        items: &[ConversationItem],
    ) {
        for item in items.iter().filter(|item| item.is_message()) {
            let Some(item_id) = item.id() else {
                continue;
            };
            let text = extract_message_text(&item.content);
            if text.is_empty() {
                continue;
            }
            let item_id = ItemId::new(item_id);
            if self.update_message(store, &item_id, &text, false) {
                let role = item
                    .role
                    .as_deref()
                    .and_then(Role::parse)
                    .unwrap_or(Role::Assistant);
                self.log.log_message(&item_id, role, &text);
            }
        }
    }

    /// Append (`is_delta`) or replace a message's text.
    ///
    /// A replacement is a final snapshot and marks the message `Done`.
    pub fn update_message<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        item_id: &ItemId,
        text: &str,
        is_delta: bool,
    ) -> bool {
        if !store.update_message(item_id, text, is_delta) {
            return false;
        }
        if !is_delta {
            self.mark_done(store, item_id);
        }
        true
    }

    // ── Streaming transcription ──────────────────────────────

    /// Target for a delta that carries no item id: the newest user message
    /// still in progress.
    pub fn resolve_target_for_untagged_delta<S: TranscriptStore + ?Sized>(
        &self,
        store: &S,
        role_hint: RoleHint,
    ) -> Option<ItemId> {
        let target = store
            .latest_user_message(&[ItemStatus::InProgress])
            .map(|item| item.item_id().clone());
        if self.debug_transcript {
            tracing::debug!(
                event = "transcription.delta_unmatched_item",
                ?role_hint,
                fallback = ?target,
            );
        }
        target
    }

    /// Apply one streamed transcription fragment.
    ///
    /// Returns the id of the message the fragment was attached to, or `None`
    /// when there was nothing to attach it to.
    pub fn apply_delta<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        payload: &TranscriptionPayload,
        role_hint: RoleHint,
    ) -> Option<ItemId> {
        let target = match delta_target_id(payload) {
            Some(id) => ItemId::new(id),
            None => match self.resolve_target_for_untagged_delta(store, role_hint) {
                Some(id) => id,
                None => {
                    tracing::debug!(?role_hint, "dropping transcription delta with no target");
                    return None;
                }
            },
        };
        let role = resolve_role(store, payload, &target, role_hint);
        ensure_message(store, &target, role);

        let text = delta_text(payload);
        if text.is_empty() {
            if self.debug_transcript {
                tracing::debug!(item_id = %target, %role, "empty transcription delta");
            }
            return Some(target);
        }
        store.update_message(&target, text, true);
        Some(target)
    }

    /// Apply a transcription completion: replace the text and finish the
    /// message.
    ///
    /// Without an item id the newest user message (in progress or done) is
    /// used.
    pub fn complete_transcription<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        payload: &TranscriptionPayload,
        role_hint: RoleHint,
    ) -> Option<ItemId> {
        let final_text = completion_text(payload);
        let target = match completion_target_id(payload) {
            Some(id) => ItemId::new(id),
            None => {
                let fallback = store
                    .latest_user_message(&[ItemStatus::InProgress, ItemStatus::Done])
                    .map(|item| item.item_id().clone());
                if self.debug_transcript {
                    tracing::debug!(
                        event = "transcription.completed_unmatched_item",
                        ?role_hint,
                        fallback = ?fallback,
                    );
                }
                fallback?
            }
        };
        let role = resolve_role(store, payload, &target, role_hint);
        ensure_message(store, &target, role);
        self.update_message(store, &target, final_text, false);
        self.log.log_message(&target, role, final_text);
        if final_text == INAUDIBLE_TEXT {
            tracing::debug!(item_id = %target, "transcription completed without text");
        }
        Some(target)
    }

    // ── Status and moderation ────────────────────────────────

    /// Mark an entry `Done`, resolving a still-pending guardrail check to a pass.
    pub fn mark_done<S: TranscriptStore + ?Sized>(&mut self, store: &mut S, item_id: &ItemId) {
        let guardrail_pending = store.items().iter().any(|item| {
            matches!(
                item,
                TranscriptItem::Message { item_id: id, guardrail: Some(g), .. }
                    if id == item_id && g.is_pending()
            )
        });
        let mut patch = ItemPatch::status(ItemStatus::Done);
        if guardrail_pending {
            patch.guardrail = Some(GuardrailResult::passed());
        }
        store.update_item(item_id, &patch);
    }

    /// Finish every message and tool note still `InProgress`.
    ///
    /// Used at session teardown so nothing from a dead session is picked up
    /// by the untagged-delta fallback. Returns the number of entries closed.
    pub fn finalize_in_progress<S: TranscriptStore + ?Sized>(&mut self, store: &mut S) -> usize {
        let open: Vec<ItemId> = store
            .items()
            .iter()
            .filter(|item| item.status() == ItemStatus::InProgress)
            .map(|item| item.item_id().clone())
            .collect();
        for item_id in &open {
            self.mark_done(store, item_id);
        }
        open.len()
    }

    /// Attach an in-progress moderation check to a message.
    pub fn mark_guardrail_pending<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        item_id: &ItemId,
    ) -> bool {
        store.update_item(item_id, &ItemPatch::guardrail(GuardrailResult::pending()))
    }

    /// Record a tripped output guardrail on the last assistant message of
    /// `history`.
    pub fn apply_guardrail_trip<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        history: &[ConversationItem],
        output: &Value,
    ) -> bool {
        let Some(moderation) = extract_moderation(output) else {
            tracing::warn!("guardrail tripped without moderation details");
            return false;
        };
        tracing::info!(category = %moderation.category, "output guardrail tripped");
        let last_assistant = history.iter().rev().find(|item| {
            item.is_message() && item.role.as_deref() == Some(Role::Assistant.as_str())
        });
        let Some(item_id) = last_assistant.and_then(ConversationItem::id) else {
            return false;
        };
        let result = GuardrailResult {
            status: ItemStatus::Done,
            category: moderation.category,
            rationale: moderation.rationale,
            test_text: moderation.test_text,
        };
        store.update_item(&ItemId::new(item_id), &ItemPatch::guardrail(result))
    }

    /// Send user text typed outside the audio stream to the transcript log.
    pub fn log_outgoing_user_text(&mut self, text: &str) {
        self.log.log_outgoing_user_text(text);
    }

    /// Forget log dedup state.
    pub fn reset(&mut self) {
        self.log.reset();
    }
}

/// Role for a transcription event targeting `target`.
///
/// `Auto` prefers the event's own role, then the role of the message already
/// in the transcript, and finally guesses `Assistant` when the event carries
/// a response id or output index and `User` otherwise.
fn resolve_role<S: TranscriptStore + ?Sized>(
    store: &S,
    payload: &TranscriptionPayload,
    target: &ItemId,
    hint: RoleHint,
) -> Role {
    match hint {
        RoleHint::User => Role::User,
        RoleHint::Assistant => Role::Assistant,
        RoleHint::Auto => payload
            .role
            .as_deref()
            .and_then(Role::parse)
            .or_else(|| store.message_role(target))
            .unwrap_or(if implies_assistant(payload) {
                Role::Assistant
            } else {
                Role::User
            }),
    }
}

fn ensure_message<S: TranscriptStore + ?Sized>(store: &mut S, item_id: &ItemId, role: Role) {
    if store.find_message(item_id, role).is_none() {
        store.add_message(item_id.clone(), role, "", false);
    }
}
