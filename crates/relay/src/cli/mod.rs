pub mod config;
pub mod remote;
pub mod serve;

use clap::{Args, Parser, Subcommand};
use rr_domain::config::Config;

/// remote-relay: relays remote-control requests between clients and a
/// single authenticated streamer.
#[derive(Debug, Parser)]
#[command(name = "remote-relay", version, about)]
pub struct Cli {
    /// Show full error details and debug logs.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the streamer and client endpoints.
    Run {
        /// Shared streamer password (falls back to the `relay.password_env`
        /// environment variable).
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        target: Target,
    },
    /// Fetch the streamer's settings and print them as JSON.
    #[command(name = "get_settings", alias = "get-settings")]
    GetSettings {
        #[command(flatten)]
        target: Target,
    },
    /// Set the streamer's zoom level.
    #[command(name = "set_zoom", alias = "set-zoom")]
    SetZoom {
        /// Zoom factor, e.g. `2.5`.
        level: f32,
        #[command(flatten)]
        target: Target,
    },
    /// Switch the streamer to another scene.
    #[command(name = "set_scene", alias = "set-scene")]
    SetScene {
        /// Scene id.
        name: String,
        #[command(flatten)]
        target: Target,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Where the relay listens (for `run`) or is reached (for client commands).
/// Unset values come from the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct Target {
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub host: Option<String>,
}

impl Target {
    /// Apply the overrides to `config.server`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `RR_CONFIG` (or `relay.toml`
/// by default). A missing file yields the defaults. Returns the parsed
/// [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("RR_CONFIG").unwrap_or_else(|_| "relay.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}
