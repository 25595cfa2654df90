//! Dispatch of inbound events to the trackers.
//!
//! The router is the only component that knows the wire vocabulary. Each
//! event runs exactly one handler path; the two tool-completion tags both
//! reach [`ToolCallLifecycleTracker::complete`], which is idempotent.

use serde_json::Value;

use crate::commands::OutboundCommand;
use crate::event_route_span;
use crate::events::{ConversationItem, InboundEvent, ResponsePayload, TransportEvent};
use crate::identity::IdentitySynthesizer;
use crate::response_step::{ResponseStepTracker, StepDecision};
use crate::session::SessionNotice;
use crate::tool_calls::ToolCallLifecycleTracker;
use crate::transcript::content::maybe_parse_json;
use crate::transcript::reconciler::{RoleHint, TranscriptReconciler};
use crate::transcript::store::TranscriptStore;
use crate::transcript::types::{ItemId, Role};

const HANDOFF_PREFIX: &str = "transfer_to_";

/// What routing one event produced besides transcript mutations.
#[derive(Debug, Default, PartialEq)]
pub struct RouteOutcome {
    /// Commands to send to the transport, in order.
    pub commands: Vec<OutboundCommand>,
    /// Session-level notices for the embedding application.
    pub notices: Vec<SessionNotice>,
}

impl RouteOutcome {
    fn command(command: OutboundCommand) -> Self {
        Self {
            commands: vec![command],
            notices: Vec::new(),
        }
    }

    fn notice(notice: SessionNotice) -> Self {
        Self {
            commands: Vec::new(),
            notices: vec![notice],
        }
    }
}

/// Owns the per-session trackers and routes events into them.
#[derive(Debug, Default)]
pub struct TransportEventRouter {
    debug_transcript: bool,
    ids: IdentitySynthesizer,
    tools: ToolCallLifecycleTracker,
    steps: ResponseStepTracker,
    reconciler: TranscriptReconciler,
}

impl TransportEventRouter {
    pub fn new(debug_transcript: bool, log_server_side: bool) -> Self {
        Self {
            debug_transcript,
            ids: IdentitySynthesizer::new(),
            tools: ToolCallLifecycleTracker::new(debug_transcript, log_server_side),
            steps: ResponseStepTracker::new(),
            reconciler: TranscriptReconciler::new(debug_transcript, log_server_side),
        }
    }

    pub fn steps(&self) -> &ResponseStepTracker {
        &self.steps
    }

    pub fn tools(&self) -> &ToolCallLifecycleTracker {
        &self.tools
    }

    pub fn identities(&self) -> &IdentitySynthesizer {
        &self.ids
    }

    pub fn reconciler_mut(&mut self) -> &mut TranscriptReconciler {
        &mut self.reconciler
    }

    /// Clear every tracker (connect / disconnect).
    pub fn reset(&mut self) {
        self.ids.reset();
        self.tools.reset();
        self.steps.reset();
        self.reconciler.reset();
    }

    /// Route one event.
    pub fn route<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        event: &InboundEvent,
    ) -> RouteOutcome {
        let span = event_route_span!(event.tag());
        let _enter = span.enter();

        match event {
            InboundEvent::Transport(event) => self.route_transport(store, event),
            InboundEvent::HistoryAdded(item) => {
                self.reconciler.history_added(store, item);
                RouteOutcome::default()
            }
            InboundEvent::HistoryUpdated(items) => {
                self.reconciler.history_updated(store, items);
                RouteOutcome::default()
            }
            InboundEvent::GuardrailTripped { history, output } => {
                self.reconciler.apply_guardrail_trip(store, history, output);
                RouteOutcome::default()
            }
            InboundEvent::McpToolCallCompleted(item) => {
                if let Some(raw_id) = item.tool_call_id() {
                    self.tools.complete(
                        &mut self.ids,
                        store,
                        raw_id,
                        item.name.as_deref(),
                        item.arguments.as_ref(),
                        item.output.as_ref(),
                    );
                }
                RouteOutcome::default()
            }
            InboundEvent::AgentToolStart {
                call_id,
                name,
                arguments,
            } => {
                if self.debug_transcript {
                    store.add_breadcrumb(
                        &format!("function call: {name}"),
                        arguments.as_ref().and_then(maybe_parse_json),
                    );
                }
                self.tools
                    .start(&mut self.ids, store, call_id, name, arguments.as_ref());
                RouteOutcome::default()
            }
            InboundEvent::AgentToolEnd {
                call_id,
                name,
                result,
            } => {
                if self.debug_transcript {
                    store.add_breadcrumb(
                        &format!("function call result: {name}"),
                        result.as_ref().and_then(maybe_parse_json),
                    );
                }
                self.tools.complete(
                    &mut self.ids,
                    store,
                    call_id,
                    Some(name),
                    None,
                    result.as_ref(),
                );
                RouteOutcome::default()
            }
            InboundEvent::AgentHandoff { to_agent, history } => {
                match handoff_target(to_agent.as_deref(), history) {
                    Some(agent) => {
                        tracing::info!(agent = %agent, "agent handoff");
                        RouteOutcome::notice(SessionNotice::AgentHandoff(agent))
                    }
                    None => {
                        tracing::debug!("agent handoff without a resolvable target");
                        RouteOutcome::default()
                    }
                }
            }
            InboundEvent::Error(payload) => {
                tracing::warn!(error = %payload, "session reported an error");
                RouteOutcome::notice(SessionNotice::Error(payload.clone()))
            }
        }
    }

    fn route_transport<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        event: &TransportEvent,
    ) -> RouteOutcome {
        match event {
            TransportEvent::ResponseCreated(envelope) => {
                let response_id = envelope.response.as_ref().and_then(|r| r.id.clone());
                self.steps.step_started(response_id);
                self.tools.discard_early_arguments();
                RouteOutcome::default()
            }
            TransportEvent::OutputItemAdded(envelope) => {
                let Some(item) = envelope.item.as_ref().filter(|i| i.is_tool_call()) else {
                    return RouteOutcome::default();
                };
                let Some(raw_id) = item.tool_call_id() else {
                    return RouteOutcome::default();
                };
                self.steps.tool_call_added(raw_id);
                self.tools.start(
                    &mut self.ids,
                    store,
                    raw_id,
                    item.name.as_deref().unwrap_or_default(),
                    item.arguments.as_ref(),
                );
                RouteOutcome::default()
            }
            TransportEvent::OutputItemDone(envelope) => {
                let Some(item) = envelope.item.as_ref().filter(|i| i.is_tool_call()) else {
                    return RouteOutcome::default();
                };
                let Some(raw_id) = item.tool_call_id() else {
                    return RouteOutcome::default();
                };
                self.tools.complete(
                    &mut self.ids,
                    store,
                    raw_id,
                    item.name.as_deref(),
                    item.arguments.as_ref(),
                    item.output.as_ref(),
                );
                self.tool_finished(raw_id)
            }
            TransportEvent::McpCallCompleted(envelope) => {
                let Some(raw_id) = non_blank(envelope.item_id.as_deref()) else {
                    return RouteOutcome::default();
                };
                self.tools
                    .complete(&mut self.ids, store, raw_id, None, None, None);
                self.tool_finished(raw_id)
            }
            TransportEvent::McpCallArgumentsDone(payload) => {
                if let Some(raw_id) = non_blank(payload.item_id.as_deref()) {
                    let fragment = payload.arguments.clone().map(Value::String);
                    self.tools
                        .merge_arguments(&self.ids, store, raw_id, fragment.as_ref());
                }
                RouteOutcome::default()
            }
            TransportEvent::ResponseDone(envelope) => {
                let response = envelope.response.clone().unwrap_or_default();
                self.response_done(store, &response)
            }
            TransportEvent::ItemCreated(envelope) => {
                if let Some(item) = envelope.item.as_ref() {
                    self.reconciler.history_added(store, item);
                }
                RouteOutcome::default()
            }
            TransportEvent::ItemRetrieved(envelope) => {
                if let Some(item) = envelope.item.as_ref() {
                    self.reconciler
                        .history_updated(store, std::slice::from_ref(item));
                }
                RouteOutcome::default()
            }
            TransportEvent::InputTranscriptionDelta(payload) => {
                self.reconciler.apply_delta(store, payload, RoleHint::User);
                RouteOutcome::default()
            }
            TransportEvent::InputTranscriptionCompleted(payload)
            | TransportEvent::InputTranscriptionDone(payload) => {
                self.reconciler
                    .complete_transcription(store, payload, RoleHint::User);
                RouteOutcome::default()
            }
            TransportEvent::AssistantTranscriptDelta(payload) => {
                self.reconciler.apply_delta(store, payload, RoleHint::Auto);
                RouteOutcome::default()
            }
            TransportEvent::AssistantTranscriptDone(payload) => {
                self.reconciler
                    .complete_transcription(store, payload, RoleHint::Auto);
                RouteOutcome::default()
            }
            TransportEvent::SpeechStarted(envelope) => {
                let payload = crate::events::TranscriptionPayload {
                    item_id: envelope.item_id.clone(),
                    delta: Some(String::new()),
                    ..Default::default()
                };
                self.reconciler.apply_delta(store, &payload, RoleHint::User);
                RouteOutcome::default()
            }
            TransportEvent::BufferCommitted(envelope) => {
                let Some(item_id) = non_blank(envelope.item_id.as_deref()) else {
                    return RouteOutcome::default();
                };
                let payload = crate::events::TranscriptionPayload {
                    item_id: Some(item_id.to_owned()),
                    delta: Some(String::new()),
                    ..Default::default()
                };
                self.reconciler.apply_delta(store, &payload, RoleHint::User);
                RouteOutcome::command(OutboundCommand::RetrieveItem {
                    item_id: item_id.to_owned(),
                })
            }
            TransportEvent::SpeechStopped(_) => RouteOutcome::default(),
            TransportEvent::Unknown { tag } => {
                tracing::debug!(tag = %tag, "dropping unhandled event");
                RouteOutcome::default()
            }
        }
    }

    fn tool_finished(&mut self, raw_id: &str) -> RouteOutcome {
        if self.steps.tool_call_completed(raw_id) {
            RouteOutcome::command(OutboundCommand::CreateResponse)
        } else {
            RouteOutcome::default()
        }
    }

    fn response_done<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        response: &ResponsePayload,
    ) -> RouteOutcome {
        self.finish_output_messages(store, &response.output);

        let mut outcome = RouteOutcome::default();
        match self.steps.step_done(response) {
            StepDecision::Continue => {
                tracing::debug!(response_id = ?response.id, "step stalled; continuing");
                outcome.commands.push(OutboundCommand::CreateResponse);
            }
            decision => tracing::debug!(?decision, response_id = ?response.id, "step done"),
        }
        if let Some(usage) = &response.usage {
            outcome.notices.push(SessionNotice::Usage(usage.clone()));
        }
        outcome
    }

    /// Make sure every assistant message in a finished step is in the
    /// transcript and marked `Done`.
    fn finish_output_messages<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &mut S,
        output: &[ConversationItem],
    ) {
        for item in output.iter().filter(|item| item.is_message()) {
            let Some(raw_id) = item.id() else {
                continue;
            };
            let role = item
                .role
                .as_deref()
                .and_then(Role::parse)
                .unwrap_or(Role::Assistant);
            let item_id = ItemId::new(raw_id);
            if store.find(&item_id).is_none() {
                self.reconciler
                    .add_message(store, item_id.clone(), role, &item.content);
            }
            self.reconciler.mark_done(store, &item_id);
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Agent that took over: the reported name, else the suffix after
/// `transfer_to_` in the last history entry's name.
fn handoff_target(to_agent: Option<&str>, history: &[ConversationItem]) -> Option<String> {
    if let Some(name) = non_blank(to_agent) {
        return Some(name.to_owned());
    }
    let last_name = history.last()?.name.as_deref()?;
    let (_, suffix) = last_name.split_once(HANDOFF_PREFIX)?;
    non_blank(Some(suffix)).map(str::to_owned)
}
