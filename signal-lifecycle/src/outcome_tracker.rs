use crate::storage::SignalStore;
use crate::summary::{BatchSummary, ItemReport};
use anyhow::{anyhow, Context, Result};
use common::{GradingConfig, MarketDataSource, SignalHistoryRecord};
use signal_generation::{grade, SignalLevels};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Grades stored signals that have no outcome yet
pub struct OutcomeTracker {
    store: Arc<dyn SignalStore>,
    market: Arc<dyn MarketDataSource>,
    config: GradingConfig,
}

impl OutcomeTracker {
    pub fn new(store: Arc<dyn SignalStore>, market: Arc<dyn MarketDataSource>, config: GradingConfig) -> Self {
        Self { store, market, config }
    }

    pub async fn grade_open(&self, limit: usize, now_ms: i64) -> Result<BatchSummary> {
        let open = self
            .store
            .list_ungraded(limit)
            .await
            .context("Failed to load ungraded signals")?;
        info!("Grading {} open signals", open.len());

        let mut summary = BatchSummary::default();
        for record in open {
            let label = format!("{} {} {}", record.symbol, record.timeframe, record.id);
            let report = match self.grade_one(&record, now_ms).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Grading {} failed: {:#}", label, e);
                    ItemReport::failed(label, format!("{:#}", e))
                }
            };
            summary.push(report);
        }
        summary.log("grade");
        Ok(summary)
    }

    async fn grade_one(&self, record: &SignalHistoryRecord, now_ms: i64) -> Result<ItemReport> {
        let label = format!("{} {} {}", record.symbol, record.timeframe, record.id);
        let levels = SignalLevels {
            entry: record.entry_price,
            stop_loss: record.stop_loss,
            targets: record.targets.clone(),
        };
        let limit = self.config.grading_limit.max(2);

        // Each page starts at the last bar of the previous one, so grading
        // resumes right after the bars already scanned.
        let mut anchor = record.entry_time;
        let mut scanned = 0;
        let graded = loop {
            let series = self
                .market
                .fetch_range(&record.symbol, &record.timeframe, anchor, now_ms, limit)
                .await
                .with_context(|| format!("Failed to fetch candles since {}", anchor))?;

            let anchor_index = series
                .index_of(anchor)
                .ok_or_else(|| anyhow!("entry bar {} not in exchange data", anchor))?;
            let graded = grade(&series, anchor_index, record.signal_type, &levels);
            scanned += series.len() - anchor_index - 1;

            let last_time = series.times().last().copied().unwrap_or(anchor);
            if graded.outcome.is_terminal() || series.len() < limit || last_time <= anchor {
                break graded;
            }
            anchor = last_time;
        };

        let (Some(price), Some(exit_time)) = (graded.price, graded.time) else {
            debug!("{} still open after {} bars", label, scanned);
            return Ok(ItemReport::skipped(label, "still open"));
        };

        if !self
            .store
            .record_outcome(record.id, graded.outcome, price, exit_time)
            .await?
        {
            return Ok(ItemReport::skipped(label, "already graded"));
        }
        info!("{} closed with {} at {}", label, graded.outcome, price);
        Ok(ItemReport::succeeded(label, graded.outcome.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::history;
    use crate::storage::InMemoryStore;
    use common::{Candle, Outcome};
    use data_ingestion::StaticMarketData;

    const MIN15: i64 = 15 * 60_000;
    const T0: i64 = 1_704_103_200_000;

    fn bar(i: i64, high: f64, low: f64) -> Candle {
        Candle {
            open_time: T0 + i * MIN15,
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
        }
    }

    fn tracker() -> (OutcomeTracker, Arc<InMemoryStore>, Arc<StaticMarketData>) {
        let store = Arc::new(InMemoryStore::new());
        let market = Arc::new(StaticMarketData::new());
        let tracker = OutcomeTracker::new(store.clone(), market.clone(), GradingConfig::default());
        (tracker, store, market)
    }

    #[tokio::test]
    async fn test_stop_beats_target_in_same_bar() {
        let (tracker, store, market) = tracker();
        market
            .set_candles("BTCUSDT", "15m", vec![bar(0, 100.5, 99.5), bar(1, 104.0, 94.0)])
            .await;
        let record = history("BTCUSDT", T0);
        store.insert_history(&record).await.unwrap();

        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        let stored = store.get_history(record.id).await.unwrap().unwrap();
        assert_eq!(stored.outcome, Outcome::Sl);
        assert_eq!(stored.outcome_price, Some(95.0));
        assert_eq!(stored.exit_time, Some(T0 + MIN15));
    }

    #[tokio::test]
    async fn test_open_signal_is_skipped_then_graded_once() {
        let (tracker, store, market) = tracker();
        market
            .set_candles("BTCUSDT", "15m", vec![bar(0, 100.5, 99.5), bar(1, 100.8, 99.0)])
            .await;
        let record = history("BTCUSDT", T0);
        store.insert_history(&record).await.unwrap();

        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.skipped, 1);

        market.upsert_candle("BTCUSDT", "15m", bar(2, 103.2, 100.0)).await;
        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.items[0].detail, "TP2");

        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.attempted, 0);
    }

    #[tokio::test]
    async fn test_touch_beyond_first_window_is_graded() {
        let store = Arc::new(InMemoryStore::new());
        let market = Arc::new(StaticMarketData::new());
        let tracker = OutcomeTracker::new(store.clone(), market.clone(), GradingConfig { grading_limit: 3 });

        let mut bars: Vec<Candle> = (0..6).map(|i| bar(i, 100.5, 99.5)).collect();
        bars.push(bar(6, 104.0, 100.0));
        market.set_candles("BTCUSDT", "15m", bars).await;
        let record = history("BTCUSDT", T0);
        store.insert_history(&record).await.unwrap();

        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.items[0].detail, "TP2");
        let stored = store.get_history(record.id).await.unwrap().unwrap();
        assert_eq!(stored.outcome, Outcome::Tp2);
        assert_eq!(stored.outcome_price, Some(103.0));
        assert_eq!(stored.exit_time, Some(T0 + 6 * MIN15));
    }

    #[tokio::test]
    async fn test_missing_entry_bar_is_failure() {
        let (tracker, store, market) = tracker();
        market.set_candles("BTCUSDT", "15m", vec![bar(1, 100.5, 99.5)]).await;
        store.insert_history(&history("BTCUSDT", T0)).await.unwrap();

        let summary = tracker.grade_open(100, T0 + 10 * MIN15).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(summary.items[0].detail.contains("entry bar"));
    }
}
