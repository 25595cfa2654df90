//! Soft wait for "the session can accept tool calls".
//!
//! Tool access depends on a credential that is minted out of band. Callers
//! that need it wait on a [`ReadinessGate`]; whoever learns the credential
//! state publishes it with [`ReadinessGate::set_state`]. Waiters resolve on
//! a satisfying state, fail fast on a terminal one, and otherwise give up
//! after a bounded wait. Nothing here touches engine state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::ReadinessConfig;
use crate::error::{RelayError, Result};

/// Credential state reported for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    /// Not known yet.
    #[default]
    Loading,
    /// No credential for this session.
    None,
    /// Demo credential for an anonymous session.
    Guest,
    /// Shared credential.
    Fallback,
    /// Personal credential for a signed-in user.
    User,
    /// Minting failed.
    Error,
}

impl ReadinessState {
    /// Parse a reported state, case-insensitively. Anything unrecognized
    /// maps to `Loading`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "fallback" => Self::Fallback,
            "guest" => Self::Guest,
            "none" => Self::None,
            "error" => Self::Error,
            _ => Self::Loading,
        }
    }

    /// Whether this state satisfies a waiter.
    pub fn is_ready_for(self, require_user_identity: bool) -> bool {
        if require_user_identity {
            self == Self::User
        } else {
            matches!(self, Self::User | Self::Guest | Self::Fallback)
        }
    }

    /// Whether waiting any longer is pointless.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::None | Self::Error)
    }
}

/// Publishes the readiness state and lets callers wait on it.
///
/// Cloning is cheap; clones share one state.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<ReadinessState>>,
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        let (tx, _rx) = watch::channel(ReadinessState::Loading);
        Self {
            tx: Arc::new(tx),
            config,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReadinessState {
        *self.tx.borrow()
    }

    /// Publish a new state, waking every waiter.
    pub fn set_state(&self, state: ReadinessState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::info!(?previous, ?state, "session readiness changed");
        }
    }

    /// Wait until the session is ready for a caller with the given identity
    /// requirement.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ReadinessUnavailable`] when the state is or becomes
    ///   `None` or `Error`.
    /// - [`RelayError::ReadinessTimeout`] when the configured bound elapses.
    pub async fn wait_ready(&self, require_user_identity: bool) -> Result<()> {
        let bound = self.config.timeout_for(require_user_identity);
        self.wait_ready_within(require_user_identity, bound).await
    }

    /// [`wait_ready`](Self::wait_ready) with an explicit bound.
    ///
    /// # Errors
    ///
    /// See [`wait_ready`](Self::wait_ready).
    pub async fn wait_ready_within(
        &self,
        require_user_identity: bool,
        bound: Duration,
    ) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let settled = rx.wait_for(|state| {
            state.is_ready_for(require_user_identity) || state.is_terminal_failure()
        });

        match tokio::time::timeout(bound, settled).await {
            Ok(Ok(state)) => {
                let state = *state;
                if state.is_ready_for(require_user_identity) {
                    Ok(())
                } else {
                    Err(unavailable(state))
                }
            }
            // The sender lives in `self`, so this only happens on teardown.
            Ok(Err(_closed)) => Err(RelayError::ReadinessUnavailable(
                "readiness source closed".to_owned(),
            )),
            Err(_elapsed) => {
                tracing::warn!(
                    require_user_identity,
                    waited_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
                    "timed out waiting for session readiness"
                );
                Err(timeout_error(require_user_identity))
            }
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(ReadinessConfig::default())
    }
}

fn unavailable(state: ReadinessState) -> RelayError {
    let message = if state == ReadinessState::Error {
        "tool credential unavailable (error state)"
    } else {
        "tool credential missing for this session"
    };
    RelayError::ReadinessUnavailable(message.to_owned())
}

fn timeout_error(require_user_identity: bool) -> RelayError {
    if require_user_identity {
        RelayError::ReadinessTimeout {
            message: "could not mint your personal tool credential".to_owned(),
            remediation: "Sign out and back in, or refresh your session credentials to regenerate the token.".to_owned(),
        }
    } else {
        RelayError::ReadinessTimeout {
            message: "timed out waiting for session readiness".to_owned(),
            remediation: "Check your connection and try again.".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(ReadinessState::parse("USER"), ReadinessState::User);
        assert_eq!(ReadinessState::parse("guest"), ReadinessState::Guest);
        assert_eq!(ReadinessState::parse("whatever"), ReadinessState::Loading);
    }

    #[test]
    fn readiness_predicate() {
        assert!(ReadinessState::User.is_ready_for(true));
        assert!(!ReadinessState::Guest.is_ready_for(true));
        assert!(ReadinessState::Fallback.is_ready_for(false));
        assert!(!ReadinessState::Loading.is_ready_for(false));
        assert!(ReadinessState::Error.is_terminal_failure());
    }

    #[tokio::test]
    async fn already_ready_resolves_immediately() {
        let gate = ReadinessGate::default();
        gate.set_state(ReadinessState::Guest);
        gate.wait_ready(false).await.unwrap();
    }

    #[tokio::test]
    async fn resolves_when_state_changes() {
        let gate = ReadinessGate::default();
        let publisher = gate.clone();
        let waiter = tokio::spawn(async move { gate.wait_ready(true).await });
        tokio::task::yield_now().await;
        publisher.set_state(ReadinessState::User);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn error_state_rejects() {
        let gate = ReadinessGate::default();
        gate.set_state(ReadinessState::Error);
        let err = gate.wait_ready(false).await.unwrap_err();
        assert_eq!(err.code(), "READINESS_UNAVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn user_wait_times_out_with_remediation() {
        let gate = ReadinessGate::default();
        gate.set_state(ReadinessState::Guest);
        let err = gate.wait_ready(true).await.unwrap_err();
        assert_eq!(err.code(), "READINESS_TIMEOUT");
        assert!(err.remediation().unwrap().contains("Sign out"));
    }
}
