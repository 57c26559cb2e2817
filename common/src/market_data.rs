use crate::types::CandleSeries;
use anyhow::Result;

/// Source of exchange candles. Implementations return bars oldest first,
/// most recent (possibly still forming) bar last.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `limit` bars.
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize)
        -> Result<CandleSeries>;

    /// Bars whose open time falls in `[start_ms, end_ms]`, at most `limit` of them.
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<CandleSeries>;
}
