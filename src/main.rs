use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use cellscope::config::Config;
use cellscope::engine::Engine;
use cellscope::server::{self, AppState};
use cellscope::store::memory::MemoryStore;
use cellscope::store::sql::SqlStore;
use cellscope::store::MeasurementStore;

/// Device telemetry aggregation service.
#[derive(Parser)]
#[command(name = "cellscope", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity override (trace, debug, info, warn, error).
    /// Defaults to the configured log_level.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("cellscope {}", version::full());
        return Ok(());
    }

    // Without a config file the defaults apply: in-memory store, port 5000.
    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // Initialize tracing. The CLI flag overrides the configured level.
    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting cellscope",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    let store: Arc<dyn MeasurementStore> = if cfg.database.url.is_empty() {
        tracing::warn!("no database.url configured, using in-memory store (data is not durable)");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            SqlStore::connect(&cfg.database.url)
                .await
                .context("connecting measurement store")?,
        )
    };

    tracing::info!(
        store = store.name(),
        capability = ?store.numeric_capability(),
        "measurement store ready"
    );

    let state = AppState {
        engine: Engine::new(store),
        default_period: cfg.stats.default_period.clone(),
        max_series_points: cfg.stats.max_series_points,
        fetch_timeout: cfg.stats.fetch_timeout,
    };

    // Set up signal handling.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        signal_cancel.cancel();
    });

    server::serve(state, &cfg.server.addr, cancel).await?;

    tracing::info!("cellscope stopped");

    Ok(())
}
