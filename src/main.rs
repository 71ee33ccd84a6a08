use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use olx_watcher::plugins::{DiscordNotifier, Notifier};
use olx_watcher::{
    AppConfig, ChromePageFetcher, Dispatcher, FileDedupStore, FilterEngine, OfferExtractor, PageFetcher,
    ScanLoop, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (defaults to config/default and config/local)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Filter rules file, overrides storage.filters_path
    #[arg(long)]
    filters: Option<String>,

    /// Sent offer id log, overrides storage.sent_offers_path
    #[arg(long)]
    sent_offers: Option<String>,

    /// Run a single scan cycle and exit
    #[arg(long)]
    once: bool,

    /// Also write daily-rotated logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new("olx_watcher=info"),
    };

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "olx-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref())?;

    info!("Starting OLX Watcher...");

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(filters) = args.filters {
        config.storage.filters_path = filters;
    }
    if let Some(sent_offers) = args.sent_offers {
        config.storage.sent_offers_path = sent_offers;
    }

    let engine = FilterEngine::load(&config.storage.filters_path);
    let dedup = FileDedupStore::open(&config.storage.sent_offers_path)
        .await
        .context("Failed to load sent offer ids")?;

    let fetcher = Arc::new(ChromePageFetcher::launch(config.browser.clone())?);
    let notifier = Arc::new(DiscordNotifier::new(config.discord.clone())?);
    if let Err(e) = notifier.connect().await {
        if let Err(close_err) = fetcher.close().await {
            warn!("Failed to close browser: {}", close_err);
        }
        return Err(e.into());
    }

    let extractor = OfferExtractor::new(config.scanner.clone(), fetcher.clone(), Arc::new(SystemClock))?;
    let dispatcher = Dispatcher::new(notifier.clone(), &config.discord);
    let cancel = CancellationToken::new();
    let mut scan_loop = ScanLoop::new(
        extractor,
        Box::new(engine),
        Box::new(dedup),
        dispatcher,
        config.scanner.scan_interval(),
        cancel.clone(),
    );

    if args.once {
        match scan_loop.run_guarded_cycle().await {
            Ok(report) => info!(
                found = report.offers_found,
                dispatched = report.dispatched,
                failed = report.failed_sends,
                "Single scan finished"
            ),
            Err(e) => error!("Scan cycle failed: {}", e),
        }
    } else {
        let handle = tokio::spawn(async move {
            scan_loop.run().await;
            scan_loop
        });

        shutdown_signal().await?;
        info!("Shutting down...");
        cancel.cancel();

        match handle.await {
            Ok(scan_loop) => info!(
                cycles = scan_loop.stats().cycles_completed,
                dispatched = scan_loop.stats().offers_dispatched,
                "Scan loop finished"
            ),
            Err(e) => error!("Scan loop task failed: {}", e),
        }
    }

    if let Err(e) = fetcher.close().await {
        warn!("Failed to close browser: {}", e);
    }
    if let Err(e) = notifier.shutdown().await {
        warn!("Failed to stop Discord client: {}", e);
    }

    info!("Stopped");
    Ok(())
}
