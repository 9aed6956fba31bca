// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OpenCTI Exporter
//
//  Probes OpenCTI on every Prometheus scrape and reports whether
//  the platform is up and how fresh its observables are.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use anyhow::Context;
use clap::Parser;
use opencti_core::{ExporterConfig, LogFormat};
use opencti_observability::{ExporterMetrics, OpenCtiCollector};
use opencti_web::{WebState, build_router, serve};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const EXPORTER_NAME: &str = "opencti_exporter";

#[derive(Parser, Debug)]
#[command(name = "opencti-exporter", version, about = "Prometheus exporter for OpenCTI")]
struct Cli {
    /// Optional YAML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Address to listen on, e.g. 0.0.0.0:10031 (overrides PORT)
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match ExporterConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{EXPORTER_NAME}: processing configuration: {e}");
            std::process::exit(e.exit_code());
        }
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(addr) = cli.listen_address {
        config.listen_address = Some(addr);
    }

    init_tracing(&config);

    if let Err(e) = run(config) {
        error!(error = ?e, "Running {EXPORTER_NAME}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &ExporterConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting {EXPORTER_NAME}");
    debug!(config = ?config, "Effective configuration");

    // ── Collector ──
    let collector = OpenCtiCollector::connect(
        &config.opencti_url,
        config.token(),
        config.opencti_timeout(),
        &config.metrics_subsystem,
    )
    .context("creating OpenCTI collector")?;
    debug!(url = %config.opencti_url, "OpenCTI collector initialized");

    let metrics = ExporterMetrics::new().context("registering exporter metrics")?;

    // ── HTTP ──
    let state = Arc::new(WebState {
        collector: Arc::new(collector),
        metrics: Arc::new(metrics),
        metrics_path: config.metrics_path.clone(),
        scrape_timeout: config.scrape_timeout(),
    });
    let router = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(
        addr = %addr,
        metrics_path = %config.metrics_path,
        opencti_url = %config.opencti_url,
        "{EXPORTER_NAME} is ready"
    );

    serve(listener, router, shutdown_signal())
        .await
        .context("HTTP server crashed")?;

    info!("{EXPORTER_NAME} stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Installing Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Installing SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
