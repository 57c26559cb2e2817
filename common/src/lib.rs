//! Shared types for the signal engine workspace.
//!
//! Everything that more than one crate needs lives here: candle series,
//! timeframes, signal and record types, the error taxonomy, the engine
//! configuration and the market-data seam.

pub mod config;
pub mod errors;
pub mod market_data;
pub mod records;
pub mod types;

pub use config::{
    load_config, save_config, DatabaseConfig, EngineConfig, GradingConfig, LevelConfig, MarketDataConfig,
    QueueConfig, ScanConfig, SignalConfig, TelegramConfig, VerificationConfig,
};
pub use errors::{EngineError, EngineResult};
pub use market_data::MarketDataSource;
pub use records::{
    now_ms, DedupKey, Outcome, QueueStatus, SignalHistoryRecord, SignalQueueRecord,
    VerificationStatus, MAX_TARGETS,
};
pub use types::{Candle, CandleSeries, SignalType, Timeframe, TimeframeUnit};

pub use uuid::Uuid;
