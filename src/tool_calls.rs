//! Tool-call lifecycle tracking.
//!
//! A tool invocation reaches us as a scatter of events: the call appears in
//! a response's output, its arguments finish streaming, and one or two
//! completion signals report the result. They are not ordered relative to
//! each other. [`ToolCallLifecycleTracker`] folds all of them into a single
//! [`TranscriptItem::ToolNote`] keyed by the synthesized id of the raw call
//! id, so duplicates merge instead of appending.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::identity::IdentitySynthesizer;
use crate::tool_lifecycle_span;
use crate::transcript::content::renderable;
use crate::transcript::log::TranscriptLog;
use crate::transcript::store::TranscriptStore;
use crate::transcript::types::{ItemId, ItemPatch, ItemStatus, TranscriptItem};

/// Name recorded for a call whose name never arrived.
pub const DEFAULT_TOOL_NAME: &str = "mcp_tool";

#[derive(Debug, Clone)]
struct ToolCallState {
    name: String,
    completed: bool,
}

/// Merges start / argument / completion signals into one tool note per call.
#[derive(Debug, Default)]
pub struct ToolCallLifecycleTracker {
    debug_breadcrumbs: bool,
    calls: HashMap<ItemId, ToolCallState>,
    /// Argument fragments that arrived before any signal minted an id.
    early_arguments: HashMap<String, Value>,
    log: TranscriptLog,
}

impl ToolCallLifecycleTracker {
    /// Create a tracker.
    ///
    /// `debug_breadcrumbs` records a `Used <tool>` breadcrumb per finished
    /// call; `log_server_side` forwards finished calls to the transcript log.
    pub fn new(debug_breadcrumbs: bool, log_server_side: bool) -> Self {
        Self {
            debug_breadcrumbs,
            log: TranscriptLog::new(log_server_side),
            ..Self::default()
        }
    }

    /// Number of calls seen since the last reset.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no call has been seen since the last reset.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Whether the call with this raw id has been completed.
    pub fn is_completed(&self, ids: &IdentitySynthesizer, raw_id: &str) -> bool {
        ids.lookup(raw_id)
            .and_then(|id| self.calls.get(id))
            .is_some_and(|state| state.completed)
    }

    /// Register a call start and return its stable id.
    ///
    /// Creates an `InProgress` note on first sight. A repeated start, or a
    /// start after completion, merges into the existing note and never moves
    /// a finished note back to `InProgress`.
    pub fn start<S: TranscriptStore + ?Sized>(
        &mut self,
        ids: &mut IdentitySynthesizer,
        store: &mut S,
        raw_id: &str,
        name: &str,
        arguments: Option<&Value>,
    ) -> Option<ItemId> {
        let span = tool_lifecycle_span!(raw_id, "start");
        let _enter = span.enter();

        let Some(stable_id) = ids.resolve_or_mint(raw_id) else {
            tracing::debug!("ignoring tool start without a call id");
            return None;
        };
        let early = self.early_arguments.remove(raw_id.trim());
        let incoming = combine(early, renderable(arguments));

        let state = self
            .calls
            .entry(stable_id.clone())
            .or_insert_with(|| ToolCallState {
                name: String::new(),
                completed: false,
            });
        if !name.is_empty() {
            state.name = name.to_owned();
        }

        if store.find(&stable_id).is_none() {
            store.add_tool_note(
                stable_id.clone(),
                &display_name(&state.name),
                incoming,
                None,
                ItemStatus::InProgress,
            );
            tracing::debug!(item_id = %stable_id, tool = %state.name, "tool call started");
        } else {
            let patch = ItemPatch {
                tool_name: Some(state.name.clone()),
                arguments: incoming.map(|value| merge_json(note_arguments(store, &stable_id), value)),
                ..ItemPatch::default()
            };
            store.update_item(&stable_id, &patch);
            tracing::debug!(item_id = %stable_id, "merged duplicate tool start");
        }
        Some(stable_id)
    }

    /// Shallow-merge a streamed argument fragment into the call's note.
    ///
    /// Fragments for a call nothing has started yet are held back and
    /// folded in when the call is started or completed; the transcript is
    /// not touched until then.
    pub fn merge_arguments<S: TranscriptStore + ?Sized>(
        &mut self,
        ids: &IdentitySynthesizer,
        store: &mut S,
        raw_id: &str,
        fragment: Option<&Value>,
    ) {
        let span = tool_lifecycle_span!(raw_id, "merge_arguments");
        let _enter = span.enter();

        let Some(parsed) = renderable(fragment) else {
            return;
        };
        let Some(stable_id) = ids.lookup(raw_id).cloned() else {
            let raw_id = raw_id.trim();
            if raw_id.is_empty() {
                return;
            }
            tracing::debug!("arguments arrived before the call started; holding");
            let held = self.early_arguments.remove(raw_id);
            if let Some(merged) = combine(held, Some(parsed)) {
                self.early_arguments.insert(raw_id.to_owned(), merged);
            }
            return;
        };
        let merged = merge_json(note_arguments(store, &stable_id), parsed);
        store.update_item(
            &stable_id,
            &ItemPatch {
                arguments: Some(merged),
                ..ItemPatch::default()
            },
        );
    }

    /// Finish a call: merge the final arguments and output, set `Done`.
    ///
    /// Safe to call repeatedly for the same raw id; later calls re-apply the
    /// merge and emit no further breadcrumbs or log lines.
    pub fn complete<S: TranscriptStore + ?Sized>(
        &mut self,
        ids: &mut IdentitySynthesizer,
        store: &mut S,
        raw_id: &str,
        name: Option<&str>,
        arguments: Option<&Value>,
        output: Option<&Value>,
    ) -> Option<ItemId> {
        let span = tool_lifecycle_span!(raw_id, "complete");
        let _enter = span.enter();

        let Some(stable_id) = ids.resolve_or_mint(raw_id) else {
            tracing::debug!("ignoring tool completion without a call id");
            return None;
        };
        let early = self.early_arguments.remove(raw_id.trim());
        let incoming_arguments = combine(early, renderable(arguments));
        let output = renderable(output);

        let state = self
            .calls
            .entry(stable_id.clone())
            .or_insert_with(|| ToolCallState {
                name: String::new(),
                completed: false,
            });
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            state.name = name.to_owned();
        }
        let tool_name = display_name(&state.name);
        let first_completion = !state.completed;
        state.completed = true;

        if store.find(&stable_id).is_none() {
            store.add_tool_note(
                stable_id.clone(),
                &tool_name,
                incoming_arguments,
                output,
                ItemStatus::Done,
            );
        } else {
            let patch = ItemPatch {
                status: Some(ItemStatus::Done),
                tool_name: Some(tool_name.clone()),
                arguments: incoming_arguments
                    .map(|value| merge_json(note_arguments(store, &stable_id), value)),
                output,
                guardrail: None,
            };
            store.update_item(&stable_id, &patch);
        }

        if first_completion {
            tracing::debug!(item_id = %stable_id, tool = %tool_name, "tool call completed");
            let (final_arguments, final_output) = note_payloads(store, &stable_id);
            self.log.log_tool(
                stable_id.as_str(),
                &tool_name,
                final_arguments.as_ref(),
                final_output.as_ref(),
            );
            if self.debug_breadcrumbs {
                store.add_breadcrumb(
                    &format!("Used {tool_name}"),
                    Some(json!({
                        "tool_id": stable_id.as_str(),
                        "arguments": final_arguments,
                        "output": final_output,
                    })),
                );
            }
        }
        Some(stable_id)
    }

    /// Number of argument fragments held for calls nothing has started.
    pub fn held_fragments(&self) -> usize {
        self.early_arguments.len()
    }

    /// Drop fragments held for calls that never started.
    ///
    /// Called when a new response step begins; a fragment that outlived its
    /// step has no call left to attach to.
    pub fn discard_early_arguments(&mut self) {
        if !self.early_arguments.is_empty() {
            tracing::debug!(
                dropped = self.early_arguments.len(),
                "dropping argument fragments for calls that never started"
            );
            self.early_arguments.clear();
        }
    }

    /// Forget every call (session reset).
    pub fn reset(&mut self) {
        self.calls.clear();
        self.early_arguments.clear();
        self.log.reset();
    }
}

/// Shallow merge: object keys from `incoming` override `existing`; any other
/// shape replaces it.
pub fn merge_json(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(extra)) => {
            base.extend(extra);
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

fn combine(earlier: Option<Value>, later: Option<Value>) -> Option<Value> {
    match (earlier, later) {
        (Some(earlier), Some(later)) => Some(merge_json(Some(earlier), later)),
        (earlier, None) => earlier,
        (None, later) => later,
    }
}

fn display_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_TOOL_NAME.to_owned()
    } else {
        name.to_owned()
    }
}

fn note_arguments<S: TranscriptStore + ?Sized>(store: &S, id: &ItemId) -> Option<Value> {
    note_payloads(store, id).0
}

fn note_payloads<S: TranscriptStore + ?Sized>(
    store: &S,
    id: &ItemId,
) -> (Option<Value>, Option<Value>) {
    store
        .items()
        .iter()
        .find_map(|item| match item {
            TranscriptItem::ToolNote {
                item_id,
                arguments,
                output,
                ..
            } if item_id == id => Some((arguments.clone(), output.clone())),
            _ => None,
        })
        .unwrap_or((None, None))
}
