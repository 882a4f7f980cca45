use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use rr_domain::config::ObservabilityConfig;
use rr_relay::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            if debug {
                eprintln!("error: {e:?}");
            } else {
                eprintln!("error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let (mut config, config_path) = cli::load_config()?;

    match cli.command {
        Command::Run { password, target } => {
            target.apply(&mut config);
            let tracer_provider = init_tracing(&config.observability, cli.debug);
            let password = cli::serve::resolve_password(&config, password)?;
            let result = cli::serve::run(Arc::new(config), password).await;

            // Flush pending spans before the process exits.
            if let Some(provider) = tracer_provider {
                if let Err(e) = provider.shutdown() {
                    tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
                }
            }
            result.map(|()| ExitCode::SUCCESS)
        }
        Command::GetSettings { target } => {
            init_cli_tracing(cli.debug);
            target.apply(&mut config);
            cli::remote::get_settings(&config.server.client_url()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::SetZoom { level, target } => {
            init_cli_tracing(cli.debug);
            target.apply(&mut config);
            cli::remote::set_zoom(&config.server.client_url(), level).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::SetScene { name, target } => {
            init_cli_tracing(cli.debug);
            target.apply(&mut config);
            cli::remote::set_scene(&config.server.client_url(), &name).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(ConfigCommand::Validate) => {
            let valid = cli::config::validate(&config, &config_path);
            Ok(if valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Config(ConfigCommand::Show) => {
            cli::config::show(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Initialize structured JSON tracing (only for the `run` command).
///
/// When `otlp_endpoint` is configured, an OpenTelemetry layer is added so
/// every `tracing` span is also exported via OTLP/gRPC. The returned
/// provider must be shut down on exit to flush pending spans.
fn init_tracing(
    obs: &ObservabilityConfig,
    debug: bool,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let default_filter = if debug { "debug" } else { "info,rr_relay=debug" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer().json();

    let Some(endpoint) = &obs.otlp_endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 starting without OpenTelemetry"
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            obs.sample_rate,
        ))
        .with_resource(resource)
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("remote-relay"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Some(tracer_provider)
}

/// Compact stderr-only tracing for one-shot client commands, so stdout
/// carries only the command's output.
fn init_cli_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
