use anyhow::{anyhow, Context, Result};
use common::{Candle, CandleSeries, EngineError, MarketDataSource, Timeframe};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Binance rejects kline requests above this limit.
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Binance spot klines connector (public REST, no API key)
pub struct BinanceConnector {
    api_url: String,
    client: Client,
}

impl BinanceConnector {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.binance.com", Duration::from_secs(10))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_url: format!("{}/api/v3/klines", base_url.trim_end_matches('/')),
            client,
        })
    }

    async fn request_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let mut query: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.to_string()),
            ("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()),
        ];
        if let Some(start) = start_ms {
            query.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_ms {
            query.push(("endTime", end.to_string()));
        }

        debug!("Fetching klines {} {} limit={} start={:?} end={:?}", symbol, timeframe, limit, start_ms, end_ms);

        let response = self
            .client
            .get(&self.api_url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Kline request failed for {} {}", symbol, timeframe))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::market_data(
                symbol,
                timeframe,
                format!("Binance API error {}: {}", status, body),
            )
            .into());
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .with_context(|| format!("Invalid kline payload for {} {}", symbol, timeframe))?;

        parse_klines(&rows)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for BinanceConnector {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<CandleSeries> {
        let candles = self.request_klines(symbol, timeframe, limit, None, None).await?;
        info!("✅ Fetched {} candles for {} {}", candles.len(), symbol, timeframe);
        Ok(CandleSeries::from_candles(&candles)?)
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<CandleSeries> {
        let interval = timeframe
            .parse::<Timeframe>()
            .map_err(anyhow::Error::from)?
            .interval_ms();

        // Paginate forward from start until the window or the limit is exhausted.
        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = start_ms;
        while cursor <= end_ms && candles.len() < limit {
            let remaining = limit - candles.len();
            let page = self
                .request_klines(symbol, timeframe, remaining, Some(cursor), Some(end_ms))
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.open_time + interval;
            let page_len = page.len();
            candles.extend(page);
            if page_len < remaining.min(MAX_KLINES_PER_REQUEST) {
                break;
            }
        }

        candles.truncate(limit);
        debug!("Fetched {} ranged candles for {} {}", candles.len(), symbol, timeframe);
        Ok(CandleSeries::from_candles(&candles)?)
    }
}

/// Decode Binance kline rows: `[openTime, "open", "high", "low", "close", "volume", ...]`.
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() < 6 {
                return Err(anyhow!("kline row {} has {} fields, expected at least 6", i, row.len()));
            }
            let open_time = row[0]
                .as_i64()
                .ok_or_else(|| anyhow!("kline row {} has a non-integer open time", i))?;
            Ok(Candle {
                open_time,
                open: number_field(&row[1], i, "open")?,
                high: number_field(&row[2], i, "high")?,
                low: number_field(&row[3], i, "low")?,
                close: number_field(&row[4], i, "close")?,
                volume: number_field(&row[5], i, "volume")?,
            })
        })
        .collect()
}

fn number_field(value: &Value, row: usize, name: &str) -> Result<f64> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("kline row {} field {} is not numeric: {}", row, name, s)),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow!("kline row {} field {} is out of range", row, name)),
        other => Err(anyhow!("kline row {} field {} has unexpected type: {}", row, name, other)),
    }
}
