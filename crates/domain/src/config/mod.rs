mod observability;
mod relay;
mod server;

pub use observability::*;
pub use relay::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        for (field, path) in [
            ("server.streamer_path", &self.server.streamer_path),
            ("server.client_path", &self.server.client_path),
        ] {
            if !path.starts_with('/') {
                errors.push(ConfigError::error(field, "path must start with '/'"));
            }
            if path == "/health" {
                errors.push(ConfigError::error(field, "/health is reserved for the health check"));
            }
        }

        if self.server.streamer_path == self.server.client_path {
            errors.push(ConfigError::error(
                "server.client_path",
                "streamer and client endpoints must use different paths",
            ));
        }

        if self.server.max_connections == 0 {
            errors.push(ConfigError::error(
                "server.max_connections",
                "max_connections must be greater than 0",
            ));
        }

        if self.relay.password_env.is_empty() {
            errors.push(ConfigError::error(
                "relay.password_env",
                "password_env must name an environment variable",
            ));
        }

        if self.relay.request_timeout_secs == 0 {
            errors.push(ConfigError::warning(
                "relay.request_timeout_secs",
                "0 disables the timeout; clients wait forever for unanswered requests",
            ));
        }

        if self.relay.max_frame_bytes == 0 {
            errors.push(ConfigError::error(
                "relay.max_frame_bytes",
                "max_frame_bytes must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }

    /// Whether [`validate`](Self::validate) reported any hard errors.
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error)
    }
}
