//! Error taxonomy shared by the engine crates.
//!
//! Configuration and data-shape problems are typed so callers can fail fast on
//! them. Transient I/O is carried as `anyhow::Error` at the orchestration layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("indicator {indicator} is missing required setting `{key}`")]
    MissingSetting { indicator: String, key: String },

    #[error("indicator {indicator} has invalid setting `{key}`: {message}")]
    InvalidSetting {
        indicator: String,
        key: String,
        message: String,
    },

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("invalid candle series: {0}")]
    InvalidSeries(String),

    #[error("invalid level configuration: {0}")]
    InvalidLevels(String),

    #[error("market data error for {symbol} {timeframe}: {message}")]
    MarketData {
        symbol: String,
        timeframe: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn missing_setting(indicator: &str, key: &str) -> Self {
        Self::MissingSetting {
            indicator: indicator.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid_setting(indicator: &str, key: &str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            indicator: indicator.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn market_data(symbol: &str, timeframe: &str, message: impl Into<String>) -> Self {
        Self::MarketData {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
