mod config;
mod export;
mod layout;
mod markdown;
mod metrics;
mod refresh;
mod scan;
mod serve;
mod session_log;
mod sessions;
mod store;

use clap::Parser;
use config::{ExporterConfig, FileConfig, Overrides};
use layout::{OpenclawHome, Workspace};
use refresh::Refresher;
use scan::WorkspaceScanner;
use std::path::PathBuf;
use std::sync::Arc;
use store::SnapshotStore;
use tokio_util::sync::CancellationToken;

/// Prometheus exporter for an OpenClaw workspace and its agent sessions.
#[derive(Parser, Debug)]
#[command(name = "openclaw-exporter", version, about)]
pub struct Cli {
    /// Address to listen on for the web interface and telemetry [default: :9101]
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    listen_address: Option<String>,

    /// Path under which to expose metrics [default: /metrics]
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    telemetry_path: Option<String>,

    /// OpenClaw workspace directory
    #[arg(long = "openclaw.dir", env = "OPENCLAW_DIR", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// OpenClaw home directory [default: ~/.openclaw]
    #[arg(long = "openclaw.home", env = "OPENCLAW_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Seconds between background workspace scans [default: 30]
    #[arg(long = "scan.interval", value_name = "SECS")]
    scan_interval: Option<u64>,

    /// Seconds one workspace scan may take before it is abandoned [default: 10]
    #[arg(long = "scan.timeout", value_name = "SECS")]
    scan_timeout: Option<u64>,

    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging (per-cycle scan results)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen_address: self.listen_address.clone(),
            telemetry_path: self.telemetry_path.clone(),
            dir: self.dir.clone(),
            home: self.home.clone(),
            interval_secs: self.scan_interval,
            timeout_secs: self.scan_timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "openclaw_exporter=debug"
    } else {
        "openclaw_exporter=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(2);
        }
    };
    tracing::debug!(?config, "resolved configuration");

    if !config.workspace.is_dir() {
        tracing::warn!(
            workspace = %config.workspace.display(),
            "workspace directory does not exist yet; workspace metrics will report missing files"
        );
    }

    let home = OpenclawHome::new(config.home.clone());
    tracing::info!(
        workspace = %config.workspace.display(),
        home = %home.root().display(),
        "openclaw-exporter starting"
    );

    let store = Arc::new(SnapshotStore::new());
    let latency = Arc::new(export::response_latency());
    let scanner = WorkspaceScanner::new(Workspace::new(config.workspace.clone()))
        .with_user_skills_dir(config.user_skills_dir.clone())
        .with_system_skills_dir(config.system_skills_dir.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let refresher = Refresher::new(scanner, Arc::clone(&store), Arc::clone(&latency), config.schedule);
    let scan_loop = tokio::spawn(refresher.run(shutdown.clone()));

    let state = serve::AppState::new(
        store,
        home,
        latency,
        &config.telemetry_path,
    );
    let result = serve::run(&config.listen_address, state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = scan_loop.await {
        tracing::error!(error = %e, "scan loop task failed");
    }

    if let Err(e) = result {
        tracing::error!(listen_address = %config.listen_address, "server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("openclaw-exporter stopped");
}

fn load_config(cli: &Cli) -> Result<ExporterConfig, config::ConfigError> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    ExporterConfig::resolve(cli.overrides(), file, |key| std::env::var(key).ok())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("signal received, starting graceful shutdown");
    token.cancel();
}
