//! Transcript model, store contract, and the reconciler that keeps it
//! consistent with the event stream.

pub mod content;
pub mod log;
pub mod reconciler;
pub mod store;
pub mod types;

pub use reconciler::{RoleHint, TranscriptReconciler};
pub use store::{Transcript, TranscriptStore};
pub use types::{GuardrailResult, ItemId, ItemPatch, ItemStatus, Role, TranscriptItem};
