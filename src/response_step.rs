//! Response-step tracking and the continuation decision.
//!
//! The backend reasons in discrete steps. A step that ends with tool calls
//! must be continued once every call has finished; a step that ends with
//! nothing actionable must be continued immediately; a step that ends with a
//! final assistant message is done. Exactly one of the two emission sites
//! fires per step, because both deactivate the step before returning.

use std::collections::HashSet;

use crate::events::ResponsePayload;

/// Tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// No step is awaiting resolution.
    Idle,
    /// A step is outstanding.
    StepActive,
}

/// What `step_done` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// The step produced a final answer.
    Finished,
    /// The step stalled; a continuation must be sent.
    Continue,
    /// The step spawned tool calls; completion drives the decision.
    AwaitTools,
    /// No active step to resolve.
    NoOp,
}

/// One backend reasoning step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseStep {
    pub response_id: Option<String>,
    pub pending: HashSet<String>,
    pub active: bool,
}

/// Owns the current [`ResponseStep`].
#[derive(Debug, Default)]
pub struct ResponseStepTracker {
    current: Option<ResponseStep>,
}

impl ResponseStepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StepState {
        match &self.current {
            Some(step) if step.active => StepState::StepActive,
            _ => StepState::Idle,
        }
    }

    /// The current step, active or not.
    pub fn current(&self) -> Option<&ResponseStep> {
        self.current.as_ref()
    }

    /// Raw ids still outstanding in the current step.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.current
            .iter()
            .flat_map(|step| step.pending.iter().map(String::as_str))
    }

    /// Replace whatever step was current with a fresh active one.
    pub fn step_started(&mut self, response_id: Option<String>) {
        if let Some(previous) = &self.current
            && previous.active
        {
            tracing::debug!(
                previous = ?previous.response_id,
                pending = previous.pending.len(),
                "discarding unresolved response step"
            );
        }
        self.current = Some(ResponseStep {
            response_id,
            pending: HashSet::new(),
            active: true,
        });
    }

    /// Record a tool call spawned by the current step.
    ///
    /// Without a current step there is nothing to attach the call to; the
    /// call is still tracked as a tool note by the caller.
    pub fn tool_call_added(&mut self, raw_id: &str) {
        let raw_id = raw_id.trim();
        if raw_id.is_empty() {
            return;
        }
        match &mut self.current {
            Some(step) => {
                step.pending.insert(raw_id.to_owned());
            }
            None => tracing::debug!(raw_id, "tool call outside any response step"),
        }
    }

    /// Record a tool completion signal.
    ///
    /// Returns `true` when this completion emptied the pending set of an
    /// active step; the step is deactivated and the caller must send one
    /// continuation. A second signal for the same call finds it already
    /// removed and returns `false`.
    pub fn tool_call_completed(&mut self, raw_id: &str) -> bool {
        let Some(step) = &mut self.current else {
            return false;
        };
        if !step.pending.remove(raw_id.trim()) {
            return false;
        }
        if step.pending.is_empty() && step.active {
            step.active = false;
            tracing::debug!(response_id = ?step.response_id, "all tool calls finished; continuing");
            return true;
        }
        false
    }

    /// Resolve the current step from its final outcome.
    pub fn step_done(&mut self, outcome: &ResponsePayload) -> StepDecision {
        let Some(step) = &mut self.current else {
            return StepDecision::NoOp;
        };
        let has_tools = outcome.has_tool_calls();
        if outcome.has_assistant_message() && !has_tools {
            step.pending.clear();
            step.active = false;
            return StepDecision::Finished;
        }
        if has_tools {
            return StepDecision::AwaitTools;
        }
        if step.active {
            step.active = false;
            return StepDecision::Continue;
        }
        StepDecision::NoOp
    }

    /// Drop the current step.
    pub fn reset(&mut self) {
        self.current = None;
    }
}
