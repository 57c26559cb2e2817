use clap::Parser;
use common::MarketDataSource;
use data_ingestion::BinanceConnector;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt;

/// Fetch the most recent candles for a symbol and print them.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    #[arg(long, default_value = "15m")]
    timeframe: String,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long, default_value = "https://api.binance.com")]
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_max_level(tracing::Level::INFO).init();

    let args = Args::parse();
    let connector = BinanceConnector::with_base_url(&args.base_url, Duration::from_secs(10))?;

    info!("Fetching {} {} candles for {}...", args.limit, args.timeframe, args.symbol);
    let series = connector
        .fetch_candles(&args.symbol, &args.timeframe, args.limit)
        .await?;

    for i in 0..series.len() {
        if let Some(candle) = series.candle(i) {
            let open_time = chrono::DateTime::from_timestamp_millis(candle.open_time)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| candle.open_time.to_string());
            println!(
                "{}  o={:.4} h={:.4} l={:.4} c={:.4} v={:.2}",
                open_time, candle.open, candle.high, candle.low, candle.close, candle.volume
            );
        }
    }

    Ok(())
}
