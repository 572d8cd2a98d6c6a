//! freqline - frequency measurement pipeline
//!
//! Runs extraction → classification → reclassification over a folder of
//! `HL*` measurement groups, or a single stage via subcommand. The exit code
//! reports which stage failed.

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use freqline::cli::{self, Args, EXIT_CONFIG};
use freqline::{PipelineConfig, PipelineDriver};
use freqline_common::config::{load_or_default, LoggingConfig};
use freqline_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("freqline: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    let (toml_config, config_path) =
        load_or_default(args.config.as_deref()).context("Failed to load config file")?;
    let config = PipelineConfig::resolve(&args.overrides(), &toml_config).context("Invalid configuration")?;

    init_tracing(&config.logging)?;

    info!(
        "Starting freqline v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config file found, using defaults"),
    }
    info!("Input root: {}", config.input_root.display());
    info!("Extraction store: {}", config.stores.extraction_path.display());
    info!("Classification store: {}", config.stores.classification_path.display());
    info!("Reclassification store: {}", config.stores.reclassification_path.display());

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let driver = PipelineDriver::new(config, EventBus::default());
    let pipeline_run = match args.command().single_stage() {
        None => driver.run(cancel_token).await,
        Some(stage) => driver.run_stage(stage, cancel_token).await,
    }
    .context("Failed to prepare stores")?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&pipeline_run)?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write run report {}", path.display()))?;
        info!("Run report written to {}", path.display());
    }

    Ok(cli::exit_code(&pipeline_run))
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = logging.level.trim().to_lowercase();
            EnvFilter::try_new(format!("freqline={level},freqline_common={level}"))
                .with_context(|| format!("Invalid log level '{}'", logging.level))?
        }
    };

    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling run");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling run");
        },
    }
}
