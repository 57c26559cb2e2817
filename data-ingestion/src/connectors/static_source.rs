use anyhow::Result;
use common::{Candle, CandleSeries, EngineError, MarketDataSource};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// In-memory candle source for replays, dry runs and tests.
pub struct StaticMarketData {
    candles: RwLock<HashMap<(String, String), Vec<Candle>>>,
    failing: RwLock<HashSet<String>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self {
            candles: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the bars held for a symbol/timeframe. Bars are sorted by open time.
    pub async fn set_candles(&self, symbol: &str, timeframe: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), timeframe.to_string()), candles);
    }

    /// Append or overwrite a single bar.
    pub async fn upsert_candle(&self, symbol: &str, timeframe: &str, candle: Candle) {
        let mut candles = self.candles.write().await;
        let bars = candles
            .entry((symbol.to_string(), timeframe.to_string()))
            .or_default();
        match bars.binary_search_by_key(&candle.open_time, |c| c.open_time) {
            Ok(i) => bars[i] = candle,
            Err(i) => bars.insert(i, candle),
        }
    }

    /// Make every request for `symbol` fail until cleared.
    pub async fn fail_symbol(&self, symbol: &str) {
        self.failing.write().await.insert(symbol.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    async fn bars(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>> {
        if self.failing.read().await.contains(symbol) {
            return Err(EngineError::market_data(symbol, timeframe, "simulated outage").into());
        }
        Ok(self
            .candles
            .read()
            .await
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for StaticMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MarketDataSource for StaticMarketData {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<CandleSeries> {
        let bars = self.bars(symbol, timeframe).await?;
        let start = bars.len().saturating_sub(limit);
        Ok(CandleSeries::from_candles(&bars[start..])?)
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<CandleSeries> {
        let bars: Vec<Candle> = self
            .bars(symbol, timeframe)
            .await?
            .into_iter()
            .filter(|c| c.open_time >= start_ms && c.open_time <= end_ms)
            .take(limit)
            .collect();
        Ok(CandleSeries::from_candles(&bars)?)
    }
}
