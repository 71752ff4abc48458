//! Scribe - batch transcription and PII redaction

use anyhow::{Context, Result};
use clap::Parser;
use scribe_common::logging::{init_logging, LogConfig, LogLevel};
use scribe_pipeline::{aws, Config, Pipeline};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about = "Transcribe audio in bulk and redact PII from the transcripts")]
struct Cli {
    /// Environment file to load before reading configuration
    #[arg(long, env = "SCRIBE_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("scribe")
        .filter_directives("aws_smithy_runtime=warn,aws_config=warn,hyper=info")
        .build()
        .with_env_overrides()?;

    let _log_guard = init_logging(&log_config)?;

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        input = %config.buckets.input_bucket,
        transcripts = %config.buckets.transcription_bucket,
        redacted = %config.buckets.redaction_bucket,
        "Configuration loaded"
    );

    let services = aws::build_services(&config).await;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let report = Pipeline::new(services, config.settings())
        .with_cancellation(cancel)
        .run()
        .await
        .context("Pipeline run failed")?;

    if report.counters.is_balanced() {
        info!(
            redacted = report.counters.redacted,
            duration_secs = report.duration_secs(),
            "All sources accounted for"
        );
    } else {
        warn!(counters = ?report.counters, "Run counters do not add up");
    }

    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, finishing jobs already submitted");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
    });
}
