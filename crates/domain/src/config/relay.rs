use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Behavior of the broker between the streamer and its clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Environment variable holding the shared streamer password.
    /// Consulted only when `run --password` is not given; the password
    /// itself is never read from the config file.
    #[serde(default = "d_password_env")]
    pub password_env: String,

    /// How long a client waits for the streamer to answer a request.
    /// `0` waits forever.
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `apiVersion` advertised in the `hello` message.
    #[serde(default = "d_api_version")]
    pub api_version: String,

    /// Inbound text frames larger than this are dropped.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            password_env: d_password_env(),
            request_timeout_secs: d_request_timeout_secs(),
            api_version: d_api_version(),
            max_frame_bytes: d_max_frame_bytes(),
        }
    }
}

impl RelayConfig {
    /// The request timeout, or `None` when waiting forever.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

fn d_password_env() -> String {
    "RR_PASSWORD".into()
}

fn d_request_timeout_secs() -> u64 {
    30
}

fn d_api_version() -> String {
    "0.1".into()
}

fn d_max_frame_bytes() -> usize {
    1024 * 1024
}
