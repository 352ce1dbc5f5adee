//! Harvest Daemon
//!
//! Watches a task directory and turns every keyword file dropped into it into
//! a merged site list, using a remote search-parsing service.

use anyhow::{Context, Result};
use clap::Parser;
use harvest_core::{ExclusionMatcher, HttpParserService, ParserService, Scanner, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Password override, read after `.env` is loaded
const PASSWORD_ENV: &str = "HARVEST_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about = "Harvest - keyword task runner for a search-parsing service")]
struct Args {
    /// Settings file; created with defaults when missing
    #[arg(short, long, default_value = "config.txt")]
    config: PathBuf,

    /// Run a single scan pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harvest_daemon=info,harvest_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    dotenvy::dotenv().ok();

    let mut settings = Settings::load_or_create(&args.config)
        .await
        .with_context(|| format!("Failed to load settings from {:?}", args.config))?;
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        settings.password = password;
    }
    info!(settings = %settings.redacted_preview(), "Settings loaded");

    for dir in [&settings.task_folder, &settings.result_folder] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }

    let service = Arc::new(HttpParserService::new(&settings.link, &settings.password)?);
    service
        .ping()
        .await
        .with_context(|| format!("Parsing service at {} is not answering", settings.link))?;
    info!(link = %settings.link, "Parsing service reachable");

    let exclusions = match &settings.exclude_file {
        Some(path) => ExclusionMatcher::load(path).await?.map(Arc::new),
        None => None,
    };

    let scanner = Scanner::new(settings, service, exclusions)?;
    if args.once {
        let report = scanner.scan_once().await?;
        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Single pass finished"
        );
        return Ok(());
    }

    scanner.run().await;
    Ok(())
}
