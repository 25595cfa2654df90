//! Configuration for the realtime relay engine.
//!
//! The config is threaded into the engine at construction time; nothing in
//! the crate reads ambient environment state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Record debug breadcrumbs (tool usage, mute/interrupt) and emit
    /// verbose transcription diagnostics.
    pub debug_transcript: bool,
    /// Forward finished messages and tool results to the `transcript_log`
    /// tracing target.
    pub log_server_side: bool,
    /// Soft-wait bounds for session readiness.
    pub readiness: ReadinessConfig,
}

/// Bounds for [`ReadinessGate::wait_ready`](crate::readiness::ReadinessGate::wait_ready).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Wait bound in milliseconds when a signed-in user identity is required.
    pub user_timeout_ms: u64,
    /// Wait bound in milliseconds for guest/fallback sessions.
    pub guest_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            user_timeout_ms: 15_000,
            guest_timeout_ms: 10_000,
        }
    }
}

impl ReadinessConfig {
    /// Wait bound for a waiter with the given identity requirement.
    pub fn timeout_for(&self, require_user_identity: bool) -> Duration {
        if require_user_identity {
            Duration::from_millis(self.user_timeout_ms)
        } else {
            Duration::from_millis(self.guest_timeout_ms)
        }
    }
}

impl RelayConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the TOML is malformed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when a readiness timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.readiness.user_timeout_ms == 0 {
            return Err(RelayError::Config(
                "readiness.user_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.readiness.guest_timeout_ms == 0 {
            return Err(RelayError::Config(
                "readiness.guest_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
