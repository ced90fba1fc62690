use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use pricewatch::config::{AppConfig, LoggingConfig, StorageBackend};
use pricewatch::extractor::LlmExtractor;
use pricewatch::plugins::NotificationDispatcher;
use pricewatch::price_checker::{CheckOutcome, CheckRunSummary};
use pricewatch::storage::open_store;
use pricewatch::{PriceChecker, PriceLedger, PriceScheduler};

#[derive(Parser)]
#[command(name = "pricewatch", version, about = "Track product prices and get notified of drops")]
struct Cli {
    /// Config file (defaults to ./pricewatch.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage backend
    #[arg(long, global = true, value_enum)]
    storage: Option<StorageArg>,

    /// Override the storage path (JSON file or SQLite database)
    #[arg(long, global = true)]
    data: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageArg {
    Memory,
    Json,
    Sqlite,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Memory => StorageBackend::Memory,
            StorageArg::Json => StorageBackend::Json,
            StorageArg::Sqlite => StorageBackend::Sqlite,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Start tracking a product page
    Track { url: String },
    /// Stop tracking a product page
    Untrack { url: String },
    /// List tracked products
    List,
    /// Show the price history of a product
    History { url: String },
    /// Check prices now: one URL, the due items, or everything with --all
    Check {
        url: Option<String>,
        #[arg(long, conflicts_with = "url")]
        all: bool,
    },
    /// Show recorded price drops
    Notifications {
        /// Mark all notifications as read
        #[arg(long)]
        read: bool,
        /// Delete all notifications
        #[arg(long, conflicts_with = "read")]
        clear: bool,
    },
    /// Check connectivity of every configured notifier
    TestNotifiers,
    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("pricewatch={}", config.level))?,
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "pricewatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn install_metrics_exporter(config: &AppConfig) -> Result<()> {
    if !config.metrics.enabled {
        return Ok(());
    }
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics.port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics on port {}", config.metrics.port);
    Ok(())
}

async fn build_checker(config: &AppConfig, ledger: Arc<PriceLedger>) -> Result<PriceChecker> {
    let extractor = LlmExtractor::from_config(config.scraper.clone(), config.llm.clone())
        .context("Failed to set up the LLM extractor")?;
    let dispatcher = NotificationDispatcher::from_config(&config.notifications).await?;

    Ok(PriceChecker::new(
        ledger,
        Arc::new(extractor),
        dispatcher,
        config.scheduler.clone(),
    ))
}

fn print_outcome(outcome: &CheckOutcome) {
    if !outcome.success {
        println!(
            "✗ {}: {}",
            outcome.url,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        return;
    }

    let price = outcome.price.as_deref().unwrap_or("-");
    match (&outcome.previous_price, outcome.price_changed) {
        (Some(previous), true) if outcome.price_drop => println!("📉 {}: {} -> {}", outcome.url, previous, price),
        (Some(previous), true) => println!("  {}: {} -> {}", outcome.url, previous, price),
        _ => println!("  {}: {} (unchanged)", outcome.url, price),
    }
}

fn print_summary(summary: &CheckRunSummary) {
    for outcome in &summary.outcomes {
        print_outcome(outcome);
    }
    println!(
        "Checked {} item(s) in {}ms: {} succeeded, {} failed, {} price change(s), {} drop(s)",
        summary.checked,
        summary.duration_ms,
        summary.succeeded,
        summary.failed,
        summary.price_changes,
        summary.price_drops
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(storage) = cli.storage {
        config.storage.backend = storage.into();
    }
    if let Some(data) = cli.data {
        config.storage.path = data;
    }

    let _log_guard = init_tracing(&config.logging)?;

    if let Command::Config = cli.command {
        let mut shown = config.clone();
        shown.llm.api_key = shown.llm.api_key.map(|_| "********".to_string());
        shown.notifications.email.password = shown.notifications.email.password.map(|_| "********".to_string());
        print!("{}", shown.to_toml()?);
        return Ok(());
    }

    let store = open_store(&config.storage).await?;
    let ledger = Arc::new(PriceLedger::new(store, config.ledger.clone()));

    match cli.command {
        Command::Run => {
            install_metrics_exporter(&config)?;
            let checker = Arc::new(build_checker(&config, ledger).await?);

            info!("Starting pricewatch...");
            let mut scheduler = PriceScheduler::new(Arc::clone(&checker), config.scheduler.clone()).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");

            scheduler.shutdown().await?;
            checker.dispatcher().shutdown().await?;
        }
        Command::Track { url } => {
            let checker = build_checker(&config, ledger).await?;
            let item = checker.track_url(&url).await?;
            match item.current_price() {
                Some(obs) => println!("Tracking {} at {}", item.name, obs.price),
                None => println!("Tracking {} (no price found yet)", item.name),
            }
        }
        Command::Untrack { url } => {
            let item = ledger.untrack(&url).await?;
            println!("Stopped tracking {}", item.name);
        }
        Command::List => {
            let items = ledger.list().await?;
            if items.is_empty() {
                println!("No tracked products");
            }
            for item in items {
                let price = item.current_price().map(|obs| obs.price.as_str()).unwrap_or("-");
                let checked = item
                    .last_checked
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}\n  {} | last checked {} | {}", item.name, price, checked, item.url);
            }
        }
        Command::History { url } => {
            let item = ledger
                .get(&url)
                .await?
                .with_context(|| format!("{} is not tracked", url))?;
            println!("{} ({} entries)", item.name, item.price_history.len());
            for obs in &item.price_history {
                println!("  {}  {}", obs.date, obs.price);
            }
            if let Some(lowest) = item.lowest_price() {
                println!("Lowest: {} on {}", lowest.price, lowest.date);
            }
        }
        Command::Check { url, all } => {
            let checker = build_checker(&config, ledger).await?;
            match url {
                Some(url) => print_outcome(&checker.check_url(&url).await?),
                None if all => print_summary(&checker.check_all().await?),
                None => print_summary(&checker.check_due(chrono::Utc::now()).await?),
            }
        }
        Command::Notifications { read, clear } => {
            if clear {
                ledger.clear_notifications().await?;
                println!("Notifications cleared");
            } else if read {
                let marked = ledger.mark_notifications_read().await?;
                println!("Marked {} notification(s) as read", marked);
            } else {
                let notifications = ledger.notifications().await?;
                if notifications.is_empty() {
                    println!("No price drops recorded");
                } else {
                    let unread = ledger.unread_notifications().await?;
                    println!("{} price drop(s), {} unread", notifications.len(), unread);
                }
                for n in notifications.iter().rev() {
                    let marker = if n.read { " " } else { "*" };
                    println!(
                        "{} {}  {}: {} -> {}\n    {}",
                        marker,
                        n.timestamp.format("%Y-%m-%d %H:%M"),
                        n.product_name,
                        n.old_price,
                        n.new_price,
                        n.url
                    );
                }
            }
        }
        Command::TestNotifiers => {
            let dispatcher = NotificationDispatcher::from_config(&config.notifications).await?;
            let results = dispatcher.test_all().await;
            if results.is_empty() {
                println!("No notifiers configured");
            }
            for (plugin_type, result) in results {
                match result {
                    Ok(true) => println!("✓ {}", plugin_type),
                    Ok(false) => println!("✗ {}: connection test failed", plugin_type),
                    Err(e) => println!("✗ {}: {}", plugin_type, e),
                }
            }
        }
        Command::Config => {}
    }

    Ok(())
}
