// SafeSite - PPE compliance monitor
// Streams annotated camera frames and keeps an audit trail of safety alerts

use anyhow::Context;
use clap::Parser;
use safesite_core::{SafesiteConfig, SourceKind};
use safesite_server::{create_router, Services, StorageMode};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safesite-server")]
#[command(about = "PPE compliance monitor with live MJPEG stream and alert audit log", version)]
struct Cli {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Detection service URL
    #[arg(long)]
    detector_url: Option<String>,

    /// Replay images from this directory instead of a capture device
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `safesite_eye=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Keep the audit log in memory only
    #[arg(long)]
    in_memory: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<SafesiteConfig> {
        let mut config = match &self.config {
            Some(path) => SafesiteConfig::from_file(&path.to_string_lossy())
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => SafesiteConfig::default(),
        };
        config.apply_env();

        if let Some(port) = self.port {
            config.network.bind_port = port;
        }
        if let Some(host) = &self.host {
            config.network.bind_address = host.clone();
        }
        if let Some(url) = &self.detector_url {
            config.detection.endpoint = url.clone();
        }
        if let Some(dir) = &self.source_dir {
            config.camera.source = SourceKind::Directory;
            config.camera.directory = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(&config.logging.level, config.logging.json);

    info!("🚀 Starting SafeSite monitor...");

    let mode = if cli.in_memory {
        StorageMode::Ephemeral
    } else {
        StorageMode::Durable
    };
    let services = Services::assemble(&config, mode).context("failed to start services")?;
    info!("✅ Services ready");

    let capture = services.capture.spawn();
    info!("🎥 Capture loop running");

    let app = create_router(services.api.clone(), config.network.enable_cors);
    let addr: SocketAddr = format!("{}:{}", config.network.bind_address, config.network.bind_port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("🌐 HTTP API listening on http://{}", addr);
    info!("   Stream:  http://{}/video_feed", addr);
    info!("   Status:  http://{}/get_status", addr);

    let broadcaster = services.api.broadcaster.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        // end open streams so the server can drain
        broadcaster.close();
    });

    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
    }

    match capture.shutdown().await {
        Ok(reason) => info!(?reason, "Capture loop finished"),
        Err(e) => warn!("Capture loop did not stop cleanly: {}", e),
    }

    info!("👋 SafeSite stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
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

    info!("🛑 Shutdown signal received");
}
