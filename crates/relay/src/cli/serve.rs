//! `remote-relay run`: serve the streamer and client endpoints.

use std::sync::Arc;

use anyhow::Context;
use rr_domain::config::{Config, ConfigSeverity};

use crate::api;
use crate::state::AppState;

/// Pick the streamer password: the `--password` flag wins, then the
/// environment variable named by `relay.password_env`.
pub fn resolve_password(config: &Config, flag: Option<String>) -> anyhow::Result<String> {
    let password = flag
        .or_else(|| std::env::var(&config.relay.password_env).ok())
        .unwrap_or_default();

    if password.is_empty() {
        anyhow::bail!(
            "a streamer password is required (pass --password or set {})",
            config.relay.password_env
        );
    }
    Ok(password)
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn run(config: Arc<Config>, password: String) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!(field = %issue.field, "{}", issue.message),
            ConfigSeverity::Warning => tracing::warn!(field = %issue.field, "{}", issue.message),
        }
    }
    if config.has_errors() {
        anyhow::bail!("invalid configuration ({} issue(s))", issues.len());
    }

    let state = AppState::new(config.clone(), password);
    let app = api::router(state);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(
        addr = %addr,
        streamer_path = %config.server.streamer_path,
        client_path = %config.server.client_path,
        request_timeout_secs = config.relay.request_timeout_secs,
        "relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
