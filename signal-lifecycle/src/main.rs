use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{load_config, now_ms, save_config, EngineConfig, MarketDataSource};
use data_ingestion::BinanceConnector;
use serde::Serialize;
use signal_generation::IndicatorRegistry;
use signal_lifecycle::{
    DedupStore, InMemoryStore, LogNotifier, NotificationGate, Notifier, OutcomeTracker,
    PendingQueue, PgSignalStore, SignalScanner, SignalStore, TelegramNotifier, Verifier,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt;

/// Batch jobs of the signal engine, meant to be run by an external scheduler.
#[derive(Debug, Parser)]
#[command(name = "signal-engine")]
struct Cli {
    /// TOML configuration file, environment variables only when omitted
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze symbols and route fresh signals
    Scan {
        /// Overrides scan.symbols
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Overrides signals.indicator
        #[arg(long)]
        indicator: Option<String>,
    },
    /// Finalize queued signals whose candle has closed
    ProcessQueue,
    /// Move FAILED queue records back to PENDING
    ResetQueue,
    /// Reconcile active signals with the exchange timeline
    Verify {
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Grade signals without an outcome
    Grade {
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// List registered indicators
    Indicators,
    /// Write a configuration template with every default filled in
    InitConfig {
        #[arg(long, default_value = "signal-engine.toml")]
        path: String,
    },
}

struct Stores {
    signals: Arc<dyn SignalStore>,
    dedup: Arc<dyn DedupStore>,
}

async fn open_stores(config: &EngineConfig) -> Result<Stores> {
    let Some(url) = &config.database.url else {
        warn!("No database.url configured, using in-memory storage");
        let store = Arc::new(InMemoryStore::new());
        return Ok(Stores {
            signals: store.clone(),
            dedup: store,
        });
    };

    let pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    let store = Arc::new(PgSignalStore::new(pool));
    store.initialize().await?;
    Ok(Stores {
        signals: store.clone(),
        dedup: store,
    })
}

fn build_notifier(config: &EngineConfig) -> Result<Arc<dyn Notifier>> {
    let timeout = Duration::from_secs(config.market_data.request_timeout_secs);
    match &config.telegram {
        Some(telegram) if telegram.enabled => Ok(Arc::new(TelegramNotifier::new(telegram, timeout)?)),
        _ => {
            info!("Telegram disabled, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    fmt().with_max_level(level).init();

    if let Command::InitConfig { path } = &cli.command {
        save_config(&EngineConfig::default(), path)?;
        info!("Configuration template written to {}", path);
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    let registry = IndicatorRegistry::with_defaults();

    if let Command::Indicators = cli.command {
        return print_json(&registry.list());
    }

    let market: Arc<dyn MarketDataSource> = Arc::new(BinanceConnector::with_base_url(
        &config.market_data.base_url,
        Duration::from_secs(config.market_data.request_timeout_secs),
    )?);
    let stores = open_stores(&config).await?;
    let gate = Arc::new(NotificationGate::new(stores.dedup.clone(), build_notifier(&config)?));
    let queue = Arc::new(PendingQueue::new(
        stores.signals.clone(),
        market.clone(),
        gate.clone(),
        config.levels.clone(),
        config.queue.clone(),
    ));

    match cli.command {
        Command::Scan { symbols, indicator } => {
            if let Some(indicator) = indicator {
                config.signals.indicator = indicator;
            }
            let symbols = if symbols.is_empty() {
                config.scan.symbols.clone()
            } else {
                symbols
            };
            let scanner = SignalScanner::new(
                &registry,
                market,
                stores.signals,
                queue,
                gate,
                config,
            )?;
            print_json(&scanner.scan(&symbols).await?)
        }
        Command::ProcessQueue => print_json(&queue.process_due(now_ms()).await?),
        Command::ResetQueue => {
            let reset = queue.reset_failed().await?;
            print_json(&serde_json::json!({ "reset": reset }))
        }
        Command::Verify { limit } => {
            let verifier = Verifier::new(stores.signals, market, config.verification.clone());
            print_json(&verifier.verify_active(limit).await?)
        }
        Command::Grade { limit } => {
            let tracker = OutcomeTracker::new(stores.signals, market, config.grading.clone());
            print_json(&tracker.grade_open(limit, now_ms()).await?)
        }
        Command::Indicators => print_json(&registry.list()),
        Command::InitConfig { .. } => Ok(()),
    }
}
