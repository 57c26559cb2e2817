//! Scan & notify.
//!
//! Analyzes a symbol list with one indicator and routes every fresh
//! signal: forming-bar signals go to the pending queue, signals on
//! closed bars are recorded and announced right away.

use crate::dedup::{NotificationGate, NotifyOutcome};
use crate::finalize::history_from_result;
use crate::notifier::format_signal_message;
use crate::queue::PendingQueue;
use crate::storage::{InsertOutcome, SignalStore};
use crate::summary::{BatchSummary, ItemReport};
use anyhow::{Context, Result};
use common::{now_ms, EngineConfig, MarketDataSource};
use futures::stream::{self, StreamExt};
use signal_generation::{AnalysisContext, IndicatorRegistry, IndicatorStrategy, StrategySettings};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SignalScanner {
    strategy: Arc<dyn IndicatorStrategy>,
    settings: Option<StrategySettings>,
    market: Arc<dyn MarketDataSource>,
    store: Arc<dyn SignalStore>,
    queue: Arc<PendingQueue>,
    gate: Arc<NotificationGate>,
    config: EngineConfig,
}

impl SignalScanner {
    /// Fails when the configured indicator is not registered.
    pub fn new(
        registry: &IndicatorRegistry,
        market: Arc<dyn MarketDataSource>,
        store: Arc<dyn SignalStore>,
        queue: Arc<PendingQueue>,
        gate: Arc<NotificationGate>,
        config: EngineConfig,
    ) -> Result<Self> {
        let strategy = registry.create(&config.signals.indicator)?;
        Ok(Self {
            strategy,
            settings: None,
            market,
            store,
            queue,
            gate,
            config,
        })
    }

    /// Run the indicator with these settings instead of its defaults.
    pub fn with_settings(mut self, settings: StrategySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub async fn scan(&self, symbols: &[String]) -> Result<BatchSummary> {
        info!(
            "Scanning {} symbols on {} with {}",
            symbols.len(),
            self.config.scan.timeframe,
            self.strategy.id()
        );

        let summary: BatchSummary = stream::iter(symbols)
            .map(|symbol| self.scan_symbol(symbol))
            .buffer_unordered(self.config.scan.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        summary.log("scan");
        Ok(summary)
    }

    async fn scan_symbol(&self, symbol: &str) -> ItemReport {
        let timeframe = &self.config.scan.timeframe;
        match self.route_symbol(symbol).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Scan of {} {} failed: {:#}", symbol, timeframe, e);
                ItemReport::failed(symbol, format!("{:#}", e))
            }
        }
    }

    async fn route_symbol(&self, symbol: &str) -> Result<ItemReport> {
        let timeframe = &self.config.scan.timeframe;
        let series = self
            .market
            .fetch_candles(symbol, timeframe, self.config.market_data.candle_limit)
            .await
            .with_context(|| format!("fetch: {} {}", symbol, timeframe))?;

        let mut ctx = AnalysisContext::new(symbol, timeframe)
            .with_levels(self.config.levels.clone())
            .with_max_signal_age(self.config.signals.max_signal_age_bars);
        if let Some(settings) = &self.settings {
            ctx = ctx.with_settings(settings.clone());
        }
        let result = self
            .strategy
            .analyze(&series, &ctx)
            .with_context(|| format!("analyze: {} {}", symbol, timeframe))?;

        if !result.is_fresh {
            debug!("{} {}: no fresh signal", symbol, timeframe);
            return Ok(ItemReport::skipped(symbol, "no fresh signal"));
        }

        if result.bars_since_signal == Some(0) {
            let outcome = self
                .queue
                .enqueue(&result)
                .await
                .with_context(|| format!("enqueue: {} {}", symbol, timeframe))?;
            return Ok(match outcome {
                InsertOutcome::Inserted => ItemReport::succeeded(symbol, "queued"),
                InsertOutcome::AlreadyPresent => ItemReport::skipped(symbol, "already queued"),
            });
        }

        let history = history_from_result(&result, now_ms())?;
        let inserted = self
            .store
            .insert_history(&history)
            .await
            .with_context(|| format!("record: {} {}", symbol, timeframe))?;

        // The dedup marker decides whether to send: a released marker is
        // re-claimed here while the signal stays fresh.
        let outcome = match self
            .gate
            .notify(&history.dedup_key(), &format_signal_message(&history), None)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Notification for {} {} not attempted: {:#}", symbol, timeframe, e);
                return Ok(ItemReport::succeeded(
                    symbol,
                    format!("notification not attempted: {:#}", e),
                ));
            }
        };

        Ok(match (inserted, outcome) {
            (InsertOutcome::AlreadyPresent, NotifyOutcome::Duplicate) => {
                debug!("{} {} signal at {} already recorded", symbol, timeframe, history.entry_time);
                ItemReport::skipped(symbol, "already recorded")
            }
            (InsertOutcome::AlreadyPresent, NotifyOutcome::Sent) => {
                info!("{} {} signal at {} delivered on retry", symbol, timeframe, history.entry_time);
                ItemReport::succeeded(symbol, "notified on retry")
            }
            (_, outcome) => ItemReport::succeeded(symbol, outcome.describe()),
        })
    }
}
