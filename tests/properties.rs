#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Interleaving properties of the trackers, checked exhaustively over small
//! event permutations.

use realtime_relay::events::{TranscriptionPayload, decode};
use realtime_relay::tool_calls::merge_json;
use realtime_relay::{
    IdentitySynthesizer, InboundEvent, ItemStatus, OutboundCommand, Role, RoleHint,
    ToolCallLifecycleTracker, Transcript, TranscriptItem, TranscriptReconciler, TranscriptStore,
    TransportEventRouter,
};
use serde_json::{Value, json};

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn tool_note(store: &Transcript, id: &str) -> (ItemStatus, Option<Value>, Option<Value>) {
    store
        .tool_notes()
        .find_map(|item| match item {
            TranscriptItem::ToolNote {
                item_id,
                status,
                arguments,
                output,
                ..
            } if item_id.as_str() == id => Some((*status, arguments.clone(), output.clone())),
            _ => None,
        })
        .expect("tool note exists")
}

// ---------------------------------------------------------------------------
// Idempotent tool-note merge
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum ToolStep {
    Start(Value),
    Merge(Value),
}

#[test]
fn tool_note_merge_is_order_independent() {
    let steps = [
        ToolStep::Start(json!("{\"wallet\":\"abc\"}")),
        ToolStep::Merge(json!("{\"amount\":1,\"token\":\"SOL\"}")),
        ToolStep::Merge(json!("{\"amount\":2}")),
    ];
    let output = json!("{\"signature\":\"5xyz\"}");

    for order in permutations(&steps) {
        let mut tracker = ToolCallLifecycleTracker::new(false, false);
        let mut ids = IdentitySynthesizer::new();
        let mut store = Transcript::new();
        let mut expected: Option<Value> = None;

        for step in &order {
            let fragment = match step {
                ToolStep::Start(args) => {
                    tracker.start(&mut ids, &mut store, "a1", "transfer", Some(args));
                    args
                }
                ToolStep::Merge(args) => {
                    tracker.merge_arguments(&ids, &mut store, "a1", Some(args));
                    args
                }
            };
            let parsed: Value = serde_json::from_str(fragment.as_str().unwrap()).unwrap();
            expected = Some(merge_json(expected, parsed));
        }
        tracker.complete(&mut ids, &mut store, "a1", None, None, Some(&output));

        let (status, arguments, out) = tool_note(&store, "tool-a1");
        assert_eq!(store.tool_notes().count(), 1, "order {order:?}");
        assert_eq!(status, ItemStatus::Done, "order {order:?}");
        assert_eq!(arguments, expected, "order {order:?}");
        assert_eq!(out, Some(json!({"signature": "5xyz"})), "order {order:?}");
    }
}

#[test]
fn repeated_completion_is_a_no_op() {
    let mut tracker = ToolCallLifecycleTracker::new(false, false);
    let mut ids = IdentitySynthesizer::new();
    let mut store = Transcript::new();
    let output = json!({"ok": true});
    tracker.start(&mut ids, &mut store, "a1", "t", None);
    tracker.complete(&mut ids, &mut store, "a1", None, None, Some(&output));
    let snapshot = store.clone();
    tracker.complete(&mut ids, &mut store, "a1", None, None, Some(&output));
    assert_eq!(store.items(), snapshot.items());
}

// ---------------------------------------------------------------------------
// Continuation
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum StepEvent {
    Done,
    /// `response.mcp_call.completed`
    Complete(&'static str),
    /// `response.output_item.done` for the same call
    ItemDone(&'static str),
}

impl StepEvent {
    fn completes(&self) -> Option<&'static str> {
        match self {
            Self::Done => None,
            Self::Complete(id) | Self::ItemDone(id) => Some(*id),
        }
    }
}

fn run_step(order: &[StepEvent], tools: &[&str], with_message: bool) -> Vec<usize> {
    let mut router = TransportEventRouter::default();
    let mut store = Transcript::new();
    let mut route = |raw: Value| -> usize {
        router
            .route(&mut store, &InboundEvent::Transport(decode(raw).unwrap()))
            .commands
            .iter()
            .filter(|c| **c == OutboundCommand::CreateResponse)
            .count()
    };

    route(json!({"type": "response.created", "response": {"id": "r1"}}));
    for id in tools {
        route(json!({"type": "response.output_item.added", "item": {"type": "mcp_call", "id": id, "name": "t"}}));
    }

    let mut output: Vec<Value> = tools
        .iter()
        .map(|id| json!({"type": "mcp_call", "id": id}))
        .collect();
    if with_message {
        output.push(json!({"type": "message", "id": "m1", "role": "assistant", "content": []}));
    }

    let per_event = order
        .iter()
        .map(|event| match event {
            StepEvent::Done => route(json!({"type": "response.done", "response": {"output": output}})),
            StepEvent::Complete(id) => route(json!({"type": "response.mcp_call.completed", "item_id": id})),
            StepEvent::ItemDone(id) => route(json!({
                "type": "response.output_item.done",
                "item": {"type": "mcp_call", "id": id, "name": "t", "output": "{\"ok\":true}"}
            })),
        })
        .collect();

    for id in tools {
        let (status, _, _) = tool_note(&store, &format!("tool-{id}"));
        assert_eq!(status, ItemStatus::Done, "order {order:?}");
    }
    assert_eq!(store.tool_notes().count(), tools.len(), "order {order:?}");
    per_event
}

/// Index of the event after which every tool has seen a completion signal.
fn last_first_completion(order: &[StepEvent], tools: &[&str]) -> Option<usize> {
    let mut seen = Vec::new();
    for (index, event) in order.iter().enumerate() {
        if let Some(id) = event.completes()
            && !seen.contains(&id)
        {
            seen.push(id);
            if seen.len() == tools.len() {
                return Some(index);
            }
        }
    }
    None
}

#[test]
fn exactly_one_continuation_for_every_interleaving() {
    let tool_sets: [&[&str]; 4] = [&[], &["a1"], &["a1", "a2"], &["a1", "a2", "a3"]];
    for tools in tool_sets {
        let mut events: Vec<StepEvent> = tools.iter().map(|id| StepEvent::Complete(*id)).collect();
        events.push(StepEvent::Done);
        for order in permutations(&events) {
            let emitted: usize = run_step(&order, tools, false).iter().sum();
            assert_eq!(emitted, 1, "tools {tools:?}, order {order:?}");
        }
    }
}

#[test]
fn duplicate_completion_signals_still_continue_once() {
    let tool_sets: [&[&'static str]; 2] = [&["a1"], &["a1", "a2"]];
    for tools in tool_sets {
        let mut events: Vec<StepEvent> = Vec::new();
        for id in tools {
            events.push(StepEvent::Complete(*id));
            events.push(StepEvent::ItemDone(*id));
        }
        events.push(StepEvent::Done);
        for order in permutations(&events) {
            let per_event = run_step(&order, tools, false);
            let emitted: usize = per_event.iter().sum();
            assert_eq!(emitted, 1, "tools {tools:?}, order {order:?}");
            let expected_at = last_first_completion(&order, tools).unwrap();
            assert_eq!(per_event[expected_at], 1, "tools {tools:?}, order {order:?}");
        }
    }
}

#[test]
fn final_message_without_tools_never_continues() {
    let emitted: usize = run_step(&[StepEvent::Done], &[], true).iter().sum();
    assert_eq!(emitted, 0);
}

#[test]
fn no_continuation_until_every_tool_completes() {
    for order in permutations(&[
        StepEvent::Complete("a1"),
        StepEvent::ItemDone("a2"),
        StepEvent::Done,
    ]) {
        let per_event = run_step(&order, &["a1", "a2"], false);
        let last_completion = last_first_completion(&order, &["a1", "a2"]).unwrap();
        for (index, emitted) in per_event.iter().enumerate() {
            let expected = usize::from(index == last_completion);
            assert_eq!(*emitted, expected, "order {order:?}, event {index}");
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript identity
// ---------------------------------------------------------------------------

#[test]
fn untagged_user_delta_targets_newest_in_progress_user_message() {
    let mut reconciler = TranscriptReconciler::default();
    let mut store = Transcript::new();
    store.add_message("u1".into(), Role::User, "older", false);
    store.add_message("a1".into(), Role::Assistant, "answer", false);
    store.add_message("u2".into(), Role::User, "newer", false);
    store.add_message("u3".into(), Role::User, "finished", false);
    reconciler.mark_done(&mut store, &"u3".into());

    let payload = TranscriptionPayload {
        delta: Some(" text".into()),
        ..TranscriptionPayload::default()
    };
    let target = reconciler
        .apply_delta(&mut store, &payload, RoleHint::User)
        .unwrap();
    assert_eq!(target.as_str(), "u2");
    let texts: Vec<_> = store.items().iter().map(|i| i.text().unwrap()).collect();
    assert_eq!(texts, vec!["older", "answer", "newer text", "finished"]);
}

#[test]
fn message_pairs_stay_unique_under_any_call_sequence() {
    let ops = ["add", "delta", "replace", "complete"];
    for order in permutations(&ops) {
        let mut reconciler = TranscriptReconciler::default();
        let mut store = Transcript::new();
        for op in &order {
            match *op {
                "add" => {
                    store.add_message("m1".into(), Role::User, "", false);
                }
                "delta" => {
                    let payload = TranscriptionPayload {
                        item_id: Some("m1".into()),
                        delta: Some("x".into()),
                        ..TranscriptionPayload::default()
                    };
                    reconciler.apply_delta(&mut store, &payload, RoleHint::User);
                }
                "replace" => {
                    reconciler.update_message(&mut store, &"m1".into(), "final", false);
                }
                _ => {
                    let payload = TranscriptionPayload {
                        item_id: Some("m1".into()),
                        transcript: Some("done".into()),
                        ..TranscriptionPayload::default()
                    };
                    reconciler.complete_transcription(&mut store, &payload, RoleHint::User);
                }
            }
        }
        let count = store
            .items()
            .iter()
            .filter(|item| item.is_message(&"m1".into(), Role::User))
            .count();
        assert_eq!(count, 1, "order {order:?}");
    }
}
