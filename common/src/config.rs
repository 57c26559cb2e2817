//! Engine configuration

use crate::errors::{EngineError, EngineResult};
use crate::records::MAX_TARGETS;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Market data source settings
    pub market_data: MarketDataConfig,

    /// Stop/target percent tables
    pub levels: LevelConfig,

    /// Signal derivation settings
    pub signals: SignalConfig,

    /// Scan & notify batch settings
    pub scan: ScanConfig,

    /// Pending queue processing settings
    pub queue: QueueConfig,

    /// Verification job settings
    pub verification: VerificationConfig,

    /// Outcome tracking settings
    pub grading: GradingConfig,

    /// Telegram delivery, disabled when absent
    pub telegram: Option<TelegramConfig>,

    /// Persistence backend, in-memory when no url is set
    pub database: DatabaseConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market_data: MarketDataConfig::default(),
            levels: LevelConfig::default(),
            signals: SignalConfig::default(),
            scan: ScanConfig::default(),
            queue: QueueConfig::default(),
            verification: VerificationConfig::default(),
            grading: GradingConfig::default(),
            telegram: None,
            database: DatabaseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would produce nonsensical levels or batches.
    pub fn validate(&self) -> EngineResult<()> {
        self.levels.validate()?;
        if self.scan.timeframe.parse::<crate::types::Timeframe>().is_err() {
            return Err(EngineError::InvalidTimeframe(self.scan.timeframe.clone()));
        }
        if self.scan.concurrency == 0 || self.queue.concurrency == 0 {
            return Err(EngineError::Configuration(
                "batch concurrency must be at least 1".to_string(),
            ));
        }
        if self.market_data.candle_limit < 2 {
            return Err(EngineError::Configuration(
                "market_data.candle_limit must be at least 2".to_string(),
            ));
        }
        if let Some(telegram) = &self.telegram {
            if telegram.enabled && (telegram.bot_token.is_empty() || telegram.chat_id.is_empty()) {
                return Err(EngineError::Configuration(
                    "telegram is enabled but bot_token or chat_id is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// REST base url of the exchange
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Number of bars fetched per analysis
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            candle_limit: default_candle_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_candle_limit() -> usize {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Stop-loss and take-profit distances as fractions of the entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default = "default_sl_pct")]
    pub sl_pct: f64,

    /// Target distances, nearest first
    #[serde(default = "default_tp_pcts")]
    pub tp_pcts: Vec<f64>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            sl_pct: default_sl_pct(),
            tp_pcts: default_tp_pcts(),
        }
    }
}

impl LevelConfig {
    /// Level construction itself accepts any table; this is the load-time gate.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.sl_pct.is_finite() || self.sl_pct <= 0.0 || self.sl_pct >= 1.0 {
            return Err(EngineError::InvalidLevels(format!(
                "sl_pct must be in (0, 1), got {}",
                self.sl_pct
            )));
        }
        if self.tp_pcts.len() > MAX_TARGETS {
            return Err(EngineError::InvalidLevels(format!(
                "at most {} targets are supported, got {}",
                MAX_TARGETS,
                self.tp_pcts.len()
            )));
        }
        for (i, pct) in self.tp_pcts.iter().enumerate() {
            if !pct.is_finite() || *pct <= 0.0 || *pct >= 1.0 {
                return Err(EngineError::InvalidLevels(format!(
                    "tp_pcts[{}] must be in (0, 1), got {}",
                    i, pct
                )));
            }
        }
        if self.tp_pcts.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidLevels(
                "tp_pcts must be strictly ascending".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_sl_pct() -> f64 {
    0.02
}

fn default_tp_pcts() -> Vec<f64> {
    vec![0.01, 0.02, 0.03, 0.05, 0.08, 0.13]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// A signal older than this many bars is stale
    #[serde(default = "default_max_signal_age_bars")]
    pub max_signal_age_bars: usize,

    /// Indicator used by the batch jobs
    #[serde(default = "default_indicator")]
    pub indicator: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            max_signal_age_bars: default_max_signal_age_bars(),
            indicator: default_indicator(),
        }
    }
}

fn default_max_signal_age_bars() -> usize {
    3
}

fn default_indicator() -> String {
    "supertrend_flip".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    /// Symbols analyzed at the same time
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            timeframe: default_timeframe(),
            concurrency: default_scan_concurrency(),
        }
    }
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframe() -> String {
    "15m".to_string()
}

fn default_scan_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Allowed distance between queued signal time and the confirmed candle open
    #[serde(default = "default_match_tolerance_ms")]
    pub match_tolerance_ms: i64,

    /// Bars fetched to confirm a queued signal
    #[serde(default = "default_confirm_limit")]
    pub confirm_limit: usize,

    /// Queue records finalized at the same time
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            match_tolerance_ms: default_match_tolerance_ms(),
            confirm_limit: default_confirm_limit(),
            concurrency: default_queue_concurrency(),
        }
    }
}

fn default_match_tolerance_ms() -> i64 {
    60_000
}

fn default_confirm_limit() -> usize {
    2
}

fn default_queue_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Bars fetched on each side of the entry time
    #[serde(default = "default_window_bars")]
    pub window_bars: i64,

    /// Largest accepted distance to the closest candle
    #[serde(default = "default_verification_tolerance_ms")]
    pub tolerance_ms: i64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            window_bars: default_window_bars(),
            tolerance_ms: default_verification_tolerance_ms(),
        }
    }
}

fn default_window_bars() -> i64 {
    100
}

fn default_verification_tolerance_ms() -> i64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Bars fetched after the entry time when grading
    #[serde(default = "default_grading_limit")]
    pub grading_limit: usize,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            grading_limit: default_grading_limit(),
        }
    }
}

fn default_grading_limit() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_enabled")]
    pub enabled: bool,

    pub bot_token: String,

    pub chat_id: String,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_enabled() -> bool {
    true
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Load configuration from an optional TOML file overlaid with
/// `SIGNAL_ENGINE__SECTION__KEY` environment variables.
pub fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix("SIGNAL_ENGINE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let config: EngineConfig = settings.try_deserialize()?;
    config.validate()?;
    info!(
        "Configuration loaded from {} ({} symbols on {}, indicator {})",
        path.unwrap_or("environment"),
        config.scan.symbols.len(),
        config.scan.timeframe,
        config.signals.indicator
    );
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &EngineConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
