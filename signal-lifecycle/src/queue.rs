//! Pending signal queue.
//!
//! A signal seen on the still-forming bar is staged until that bar closes,
//! then finalized from the exchange's confirmed candle.

use crate::dedup::NotificationGate;
use crate::finalize::history_from_queued;
use crate::notifier::format_signal_message;
use crate::storage::{InsertOutcome, SignalStore};
use crate::summary::{BatchSummary, ItemReport};
use anyhow::{anyhow, bail, Context, Result};
use common::{
    now_ms, Candle, CandleSeries, EngineResult, LevelConfig, MarketDataSource, QueueConfig,
    QueueStatus, SignalHistoryRecord, SignalQueueRecord, Timeframe,
};
use futures::stream::{self, StreamExt};
use signal_generation::IndicatorResult;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upper bound on records picked up by one processing run.
const DUE_BATCH_LIMIT: usize = 500;

/// Close of the bar that contains `signal_time`.
pub fn candle_close_time(signal_time: i64, timeframe: &str) -> EngineResult<i64> {
    let timeframe: Timeframe = timeframe.parse()?;
    Ok(timeframe.bar_close(signal_time))
}

/// Exact open-time match, else the nearest bar within `tolerance_ms`, else
/// the second most recent bar (the last fully closed one).
pub fn select_candle(series: &CandleSeries, signal_time: i64, tolerance_ms: i64) -> Option<Candle> {
    if let Some(i) = series.index_of(signal_time) {
        return series.candle(i);
    }
    let nearest = series
        .times()
        .iter()
        .enumerate()
        .map(|(i, t)| (i, (t - signal_time).abs()))
        .filter(|(_, delta)| *delta <= tolerance_ms)
        .min_by_key(|(_, delta)| *delta);
    if let Some((i, _)) = nearest {
        return series.candle(i);
    }
    series.len().checked_sub(2).and_then(|i| series.candle(i))
}

pub fn queue_record(result: &IndicatorResult, now_ms: i64) -> Result<SignalQueueRecord> {
    let missing = || anyhow!("{} {} has no signal to queue", result.symbol, result.timeframe);
    let signal_type = result.last_signal.ok_or_else(missing)?;
    let levels = result.levels.as_ref().ok_or_else(missing)?;
    let signal_time = result.last_signal_time.ok_or_else(missing)?;

    Ok(SignalQueueRecord {
        id: Uuid::new_v4(),
        symbol: result.symbol.clone(),
        timeframe: result.timeframe.clone(),
        signal_type,
        indicator: result.indicator.clone(),
        observed_price: levels.entry,
        targets: levels.targets.clone(),
        stop_loss: levels.stop_loss,
        is_fresh: result.is_fresh,
        volume_confirmed: result.volume_confirmed,
        signal_time,
        candle_close_time: candle_close_time(signal_time, &result.timeframe)?,
        status: QueueStatus::Pending,
        error_message: None,
        attempts: 0,
        created_at: now_ms,
        updated_at: now_ms,
    })
}

pub struct PendingQueue {
    store: Arc<dyn SignalStore>,
    market: Arc<dyn MarketDataSource>,
    gate: Arc<NotificationGate>,
    levels: LevelConfig,
    config: QueueConfig,
}

impl PendingQueue {
    pub fn new(
        store: Arc<dyn SignalStore>,
        market: Arc<dyn MarketDataSource>,
        gate: Arc<NotificationGate>,
        levels: LevelConfig,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            market,
            gate,
            levels,
            config,
        }
    }

    /// Stage a forming-bar signal.
    pub async fn enqueue(&self, result: &IndicatorResult) -> Result<InsertOutcome> {
        let record = queue_record(result, now_ms())?;
        let outcome = self.store.enqueue(&record).await?;
        if outcome == InsertOutcome::Inserted {
            info!(
                "Queued {} {} {} until {}",
                record.signal_type, record.symbol, record.timeframe, record.candle_close_time
            );
        }
        Ok(outcome)
    }

    /// Finalize every record whose candle has closed by `now_ms`.
    pub async fn process_due(&self, now_ms: i64) -> Result<BatchSummary> {
        let due = self
            .store
            .due_queue(now_ms, DUE_BATCH_LIMIT)
            .await
            .context("Failed to load due queue")?;
        info!("Processing {} due queued signals", due.len());

        let summary: BatchSummary = stream::iter(due)
            .map(|record| self.process_one(record, now_ms))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        summary.log("process-queue");
        Ok(summary)
    }

    /// Requeue everything that failed.
    pub async fn reset_failed(&self) -> Result<usize> {
        let reset = self.store.reset_failed(now_ms()).await?;
        info!("Reset {} failed queued signals", reset);
        Ok(reset)
    }

    async fn process_one(&self, record: SignalQueueRecord, now_ms: i64) -> ItemReport {
        let label = format!("{} {} {}", record.symbol, record.timeframe, record.id);

        let history = match self.finalize(&record, now_ms).await {
            Ok(history) => history,
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("Queued signal {} failed: {}", label, message);
                if let Err(mark_err) = self.store.mark_failed(record.id, &message, now_ms).await {
                    error!("Failed to mark queued signal {} failed: {:#}", label, mark_err);
                }
                return ItemReport::failed(label, message);
            }
        };

        let detail = match self
            .gate
            .notify(&history.dedup_key(), &format_signal_message(&history), None)
            .await
        {
            Ok(outcome) => outcome.describe(),
            Err(e) => {
                error!("Notification for {} not attempted: {:#}", label, e);
                format!("notification not attempted: {:#}", e)
            }
        };
        ItemReport::succeeded(label, detail)
    }

    async fn finalize(&self, record: &SignalQueueRecord, now_ms: i64) -> Result<SignalHistoryRecord> {
        let series = self
            .market
            .fetch_candles(&record.symbol, &record.timeframe, self.config.confirm_limit)
            .await
            .with_context(|| format!("Failed to fetch candles for {} {}", record.symbol, record.timeframe))?;
        if series.is_empty() {
            bail!("no candles returned for {} {}", record.symbol, record.timeframe);
        }

        let candle = select_candle(&series, record.signal_time, self.config.match_tolerance_ms)
            .ok_or_else(|| anyhow!("no confirmed candle for signal at {}", record.signal_time))?;
        let history = history_from_queued(record, &candle, &self.levels, now_ms);

        self.store
            .insert_history(&history)
            .await
            .context("Failed to store finalized signal")?;
        self.store
            .mark_processed(record.id, now_ms)
            .await
            .context("Failed to mark queued signal processed")?;

        info!(
            "Finalized {} {} {} at {} (candle {})",
            history.signal_type, history.symbol, history.timeframe, history.entry_price, history.entry_time
        );
        Ok(history)
    }
}
