use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_2345")]
    pub port: u16,
    /// Bind address. All interfaces by default, since the streamer is
    /// usually another device on the network.
    #[serde(default = "d_host")]
    pub host: String,
    /// WebSocket path the streamer connects to.
    #[serde(default = "d_streamer_path")]
    pub streamer_path: String,
    /// WebSocket path downstream clients connect to.
    #[serde(default = "d_client_path")]
    pub client_path: String,
    /// Upper bound on open WebSockets, streamer and clients together.
    /// Upgrades beyond it are answered with 503. Also caps concurrent
    /// in-flight HTTP requests.
    #[serde(default = "d_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_2345(),
            host: d_host(),
            streamer_path: d_streamer_path(),
            client_path: d_client_path(),
            max_connections: d_max_connections(),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL of the client endpoint, as used by the one-shot
    /// CLI commands. A wildcard bind address is dialed on loopback.
    pub fn client_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        format!("ws://{host}:{}{}", self.port, self.client_path)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_2345() -> u16 {
    2345
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_streamer_path() -> String {
    "/".into()
}
fn d_client_path() -> String {
    "/client".into()
}
fn d_max_connections() -> usize {
    256
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_parses_partial_table() {
        let toml_str = r#"
            port = 8080
            host = "0.0.0.0"
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.streamer_path, "/");
        assert_eq!(cfg.client_path, "/client");
    }

    #[test]
    fn default_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.addr(), "0.0.0.0:2345");
    }

    #[test]
    fn client_url_dials_loopback_for_wildcard_bind() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.client_url(), "ws://127.0.0.1:2345/client");

        let cfg = ServerConfig {
            host: "::".into(),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.client_url(), "ws://[::1]:2345/client");
    }

    #[test]
    fn client_url_keeps_explicit_host() {
        let cfg = ServerConfig {
            host: "studio.local".into(),
            client_path: "/remote".into(),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.client_url(), "ws://studio.local:2345/remote");
    }
}
