use crate::storage::SignalStore;
use crate::summary::{BatchSummary, ItemReport};
use anyhow::{Context, Result};
use common::{MarketDataSource, SignalHistoryRecord, Timeframe, VerificationConfig, VerificationStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Closest exchange bar to a recorded entry time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleMatch {
    pub open_time: i64,
    /// Absolute difference to the recorded entry time, 0 for an exact match
    pub delta_ms: i64,
}

/// Exact open-time match, else the nearest bar.
pub fn closest_candle(times: &[i64], entry_time: i64) -> Option<CandleMatch> {
    times
        .iter()
        .map(|t| CandleMatch {
            open_time: *t,
            delta_ms: (t - entry_time).abs(),
        })
        .min_by_key(|m| m.delta_ms)
}

/// Reconciles ACTIVE signals against the exchange's candle timeline
pub struct Verifier {
    store: Arc<dyn SignalStore>,
    market: Arc<dyn MarketDataSource>,
    config: VerificationConfig,
}

impl Verifier {
    pub fn new(store: Arc<dyn SignalStore>, market: Arc<dyn MarketDataSource>, config: VerificationConfig) -> Self {
        Self { store, market, config }
    }

    pub async fn verify_active(&self, limit: usize) -> Result<BatchSummary> {
        let active = self
            .store
            .list_active(limit)
            .await
            .context("Failed to load active signals")?;
        info!("Verifying {} active signals", active.len());

        let mut summary = BatchSummary::default();
        for record in active {
            let label = format!("{} {} {}", record.symbol, record.timeframe, record.id);
            let report = match self.verify_one(&record).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Verification of {} failed: {:#}", label, e);
                    ItemReport::failed(label, format!("{:#}", e))
                }
            };
            summary.push(report);
        }
        summary.log("verify");
        Ok(summary)
    }

    async fn verify_one(&self, record: &SignalHistoryRecord) -> Result<ItemReport> {
        let label = format!("{} {} {}", record.symbol, record.timeframe, record.id);
        let timeframe: Timeframe = record.timeframe.parse()?;
        let window = self.config.window_bars * timeframe.interval_ms();
        let series = self
            .market
            .fetch_range(
                &record.symbol,
                &record.timeframe,
                record.entry_time - window,
                record.entry_time + window,
                (2 * self.config.window_bars + 1) as usize,
            )
            .await
            .with_context(|| format!("Failed to fetch candles around {}", record.entry_time))?;

        let matched = closest_candle(series.times(), record.entry_time)
            .filter(|m| m.delta_ms <= self.config.tolerance_ms);

        let (status, candle_time, detail) = match matched {
            Some(m) => (
                VerificationStatus::Matched,
                Some(m.open_time),
                format!("matched, delta {} ms", m.delta_ms),
            ),
            None => (VerificationStatus::NotFound, None, "no candle within tolerance".to_string()),
        };

        if !self.store.record_verification(record.id, status, candle_time).await? {
            debug!("{} was verified concurrently", label);
            return Ok(ItemReport::skipped(label, "already verified"));
        }
        info!("{}: {}", label, detail);
        Ok(ItemReport::succeeded(label, format!("{}: {}", status.as_str(), detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::history;
    use crate::storage::InMemoryStore;
    use common::Candle;
    use data_ingestion::StaticMarketData;

    const MIN15: i64 = 15 * 60_000;
    const T0: i64 = 1_704_103_200_000;

    fn bars(start: i64, count: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle {
                open_time: start + i * MIN15,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect()
    }

    fn verifier() -> (Verifier, Arc<InMemoryStore>, Arc<StaticMarketData>) {
        let store = Arc::new(InMemoryStore::new());
        let market = Arc::new(StaticMarketData::new());
        let verifier = Verifier::new(store.clone(), market.clone(), VerificationConfig::default());
        (verifier, store, market)
    }

    #[test]
    fn test_closest_candle() {
        let times = [0, 900_000, 1_800_000];
        assert_eq!(
            closest_candle(&times, 900_000),
            Some(CandleMatch { open_time: 900_000, delta_ms: 0 })
        );
        assert_eq!(closest_candle(&times, 1_000_000).unwrap().open_time, 900_000);
        assert_eq!(closest_candle(&[], 5), None);
    }

    #[tokio::test]
    async fn test_exact_match_and_ten_seconds_off() {
        let (verifier, store, market) = verifier();
        market.set_candles("BTCUSDT", "15m", bars(T0 - 10 * MIN15, 20)).await;
        let exact = history("BTCUSDT", T0);
        let mut skewed = history("BTCUSDT", T0 + MIN15 + 10_000);
        skewed.indicator = "macd_bollinger".to_string();
        store.insert_history(&exact).await.unwrap();
        store.insert_history(&skewed).await.unwrap();

        let summary = verifier.verify_active(100).await.unwrap();
        assert_eq!(summary.succeeded, 2);

        let exact = store.get_history(exact.id).await.unwrap().unwrap();
        assert_eq!(exact.status, VerificationStatus::Matched);
        assert_eq!(exact.exchange_candle_time, Some(T0));

        let skewed = store.get_history(skewed.id).await.unwrap().unwrap();
        assert_eq!(skewed.status, VerificationStatus::NotFound);
        assert_eq!(skewed.exchange_candle_time, None);
    }

    #[tokio::test]
    async fn test_within_tolerance_matches_nearest() {
        let (verifier, store, market) = verifier();
        market.set_candles("BTCUSDT", "15m", bars(T0 - 10 * MIN15, 20)).await;
        let record = history("BTCUSDT", T0 + 3_000);
        store.insert_history(&record).await.unwrap();

        let summary = verifier.verify_active(100).await.unwrap();
        assert!(summary.items[0].detail.contains("delta 3000 ms"));
        let stored = store.get_history(record.id).await.unwrap().unwrap();
        assert_eq!(stored.exchange_candle_time, Some(T0));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_record_active() {
        let (verifier, store, market) = verifier();
        market.fail_symbol("BTCUSDT").await;
        market.set_candles("ETHUSDT", "15m", bars(T0, 1)).await;
        let broken = history("BTCUSDT", T0);
        let fine = history("ETHUSDT", T0);
        store.insert_history(&broken).await.unwrap();
        store.insert_history(&fine).await.unwrap();

        let summary = verifier.verify_active(100).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        let broken = store.get_history(broken.id).await.unwrap().unwrap();
        assert_eq!(broken.status, VerificationStatus::Active);
    }
}
