//! coffee-scout: one scheduled ingestion run.
//! Loads config, wires transport, store and alert sink, runs every enabled platform.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coffee_scout::config::{CliOverrides, ScraperConfig};
use coffee_scout::ingest::fetch::ReqwestTransport;
use coffee_scout::ingest::providers::default_adapters;
use coffee_scout::ingest::types::Platform;
use coffee_scout::notify::WebhookNotifier;
use coffee_scout::store::Store;
use coffee_scout::{CancelFlag, ScrapeContext};

#[derive(Debug, Parser)]
#[command(
    name = "coffee-scout",
    version,
    about = "Scrape Minnesota coffee chatter across platforms"
)]
struct Args {
    /// Config file (JSON, or TOML by extension). Missing file means defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only run these platforms (comma separated).
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    include: Vec<Platform>,

    /// Skip these platforms (comma separated).
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    exclude: Vec<Platform>,

    /// Max accepted items per platform.
    #[arg(long)]
    limit: Option<usize>,

    /// Run everything but write nothing to the database.
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    output_json: Option<PathBuf>,

    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long)]
    report_dir: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let mut config = ScraperConfig::load(args.config.as_deref()).context("loading config")?;
    config.apply_cli(CliOverrides {
        include: args.include,
        exclude: args.exclude,
        limit: args.limit,
        dry_run: args.dry_run,
        output_json: args.output_json,
        db_path: args.db,
        report_dir: args.report_dir,
    });

    let transport = ReqwestTransport::new(
        config.proxy.as_deref(),
        Duration::from_secs(config.fetch.timeout_secs.max(1)),
    )
    .context("building http client")?;

    let store = if config.dry_run {
        None
    } else {
        match Store::open(&config.db_path) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(
                    event = "store_failed",
                    path = %config.db_path.display(),
                    error = %e,
                    "could not open database; continuing without it"
                );
                None
            }
        }
    };

    let adapters = default_adapters(&config);
    let webhook = config.alert_webhook.clone();
    let cancel = CancelFlag::new();
    let mut ctx = ScrapeContext::new(config, Arc::new(transport))?.with_cancel(cancel.clone());
    if let Some(s) = store {
        ctx = ctx.with_store(s);
    }
    if let Some(url) = webhook {
        ctx = ctx.with_alert_sink(Box::new(WebhookNotifier::new(url)));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; finishing current platform");
            cancel.cancel();
        }
    });

    let outcome = ctx.run(&adapters).await;
    info!(
        run_id = %outcome.run_id,
        items = outcome.items.len(),
        inserted = outcome.inserted,
        "done"
    );
    Ok(())
}
