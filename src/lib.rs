//! Realtime relay: tool-chaining and transcript reconciliation for
//! streaming voice/text conversations.
//!
//! The engine sits between a realtime conversational transport and a
//! rendered transcript:
//! Transport events → Router → {tool calls, transcript, response steps} → store / outbound commands
//!
//! # Architecture
//!
//! - **Events**: a closed vocabulary decoded from the wire ([`events`])
//! - **Router**: dispatches each event to exactly one handler path ([`router`])
//! - **Tool calls**: merges start / argument / completion signals into one note ([`tool_calls`])
//! - **Transcript**: idempotent message reconciliation over a store ([`transcript`])
//! - **Response steps**: decides when the backend must be told to continue ([`response_step`])
//! - **Session**: connect / disconnect / mute / interrupt and the event pump ([`session`])
//!
//! Everything runs on one logical consumer; no tracker is shared.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod observability;
pub mod readiness;
pub mod response_step;
pub mod router;
pub mod session;
pub mod tool_calls;
pub mod transcript;
pub mod transport;

pub use commands::OutboundCommand;
pub use config::{ReadinessConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use events::{InboundEvent, TransportEvent};
pub use identity::IdentitySynthesizer;
pub use readiness::{ReadinessGate, ReadinessState};
pub use response_step::{ResponseStepTracker, StepDecision, StepState};
pub use router::{RouteOutcome, TransportEventRouter};
pub use session::{SessionLifecycleController, SessionNotice, SessionStatus};
pub use tool_calls::ToolCallLifecycleTracker;
pub use transcript::{
    ItemId, ItemStatus, Role, RoleHint, Transcript, TranscriptItem, TranscriptReconciler,
    TranscriptStore,
};
pub use transport::{ChannelTransport, Transport, TransportCommand};
