//! Error types for the realtime relay engine.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`RelayError::code()`].
//!
//! Almost nothing in the engine surfaces these to the event loop: malformed
//! events fall back to heuristics, duplicate lifecycle signals merge, and
//! failed outbound sends are logged and dropped. The variants here exist for
//! the few operations that a *caller* invokes directly (connect, send user
//! text, wait for readiness, load config).

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// A user operation needs a live transport but the session is not connected.
    pub const NOT_CONNECTED: &str = "NOT_CONNECTED";

    /// The transport rejected an outbound command.
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Raw inbound payload could not be decoded into an event.
    pub const DECODE_FAILED: &str = "DECODE_FAILED";

    /// Waited too long for the session to become ready for tool calls.
    pub const READINESS_TIMEOUT: &str = "READINESS_TIMEOUT";

    /// The readiness source reported a terminal failure state.
    pub const READINESS_UNAVAILABLE: &str = "READINESS_UNAVAILABLE";

    /// Filesystem error while reading or writing configuration.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Errors produced by the relay engine.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A user operation needs a live transport but the session is not connected.
    #[error("[{}] {}", error_codes::NOT_CONNECTED, .0)]
    NotConnected(String),

    /// The transport rejected an outbound command.
    #[error("[{}] {}", error_codes::TRANSPORT_FAILED, .0)]
    Transport(String),

    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Raw inbound payload could not be decoded into an event.
    #[error("[{}] {}", error_codes::DECODE_FAILED, .0)]
    Decode(String),

    /// Waited too long for readiness.
    #[error("[{}] {message}", error_codes::READINESS_TIMEOUT)]
    ReadinessTimeout {
        /// What timed out.
        message: String,
        /// What the user can do about it.
        remediation: String,
    },

    /// The readiness source reported a terminal failure state.
    #[error("[{}] {}", error_codes::READINESS_UNAVAILABLE, .0)]
    ReadinessUnavailable(String),

    /// Filesystem error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => error_codes::NOT_CONNECTED,
            Self::Transport(_) => error_codes::TRANSPORT_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Decode(_) => error_codes::DECODE_FAILED,
            Self::ReadinessTimeout { .. } => error_codes::READINESS_TIMEOUT,
            Self::ReadinessUnavailable(_) => error_codes::READINESS_UNAVAILABLE,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotConnected(m)
            | Self::Transport(m)
            | Self::Config(m)
            | Self::Decode(m)
            | Self::ReadinessUnavailable(m) => m.clone(),
            Self::ReadinessTimeout { message, .. } => message.clone(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Human-readable remediation hint, when the error carries one.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::ReadinessTimeout { remediation, .. } => Some(remediation),
            _ => None,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_prefix() {
        let err = RelayError::NotConnected("session closed".into());
        let display = err.to_string();
        assert!(display.starts_with("[NOT_CONNECTED]"));
        assert!(display.contains("session closed"));
    }

    #[test]
    fn readiness_timeout_exposes_remediation() {
        let err = RelayError::ReadinessTimeout {
            message: "timed out waiting for tool readiness".into(),
            remediation: "sign out and back in".into(),
        };
        assert_eq!(err.code(), "READINESS_TIMEOUT");
        assert_eq!(err.remediation(), Some("sign out and back in"));
        assert_eq!(err.message(), "timed out waiting for tool readiness");
    }

    #[test]
    fn other_errors_have_no_remediation() {
        let err = RelayError::Transport("channel closed".into());
        assert!(err.remediation().is_none());
        assert_eq!(err.message(), "channel closed");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RelayError = io.into();
        assert_eq!(err.code(), "IO_ERROR");
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors = [
            RelayError::NotConnected("x".into()),
            RelayError::Transport("x".into()),
            RelayError::Config("x".into()),
            RelayError::Decode("x".into()),
            RelayError::ReadinessTimeout {
                message: "x".into(),
                remediation: "y".into(),
            },
            RelayError::ReadinessUnavailable("x".into()),
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RelayError>();
    }
}
