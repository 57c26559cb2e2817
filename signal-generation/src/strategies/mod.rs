//! Indicator strategies.
//!
//! A strategy turns a candle series into a per-bar signal vector. The shared
//! `analyze` step derives freshness, levels and the graded outcome from that
//! vector the same way for every strategy.

use crate::derivation::DEFAULT_MAX_SIGNAL_AGE_BARS;
use crate::signals::IndicatorResult;
use common::{CandleSeries, EngineError, EngineResult, LevelConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub mod adx_di_cross;
pub mod heikin_ashi_trend;
pub mod macd_bollinger;
pub mod pivot_breakout;
pub mod rsi_volume_bollinger;
pub mod supertrend_flip;

pub use adx_di_cross::AdxDiCross;
pub use heikin_ashi_trend::HeikinAshiTrend;
pub use macd_bollinger::MacdBollinger;
pub use pivot_breakout::PivotBreakout;
pub use rsi_volume_bollinger::RsiVolumeBollinger;
pub use supertrend_flip::SupertrendFlip;

/// Longest lookback a period setting may ask for. Keeps `min_bars` sums far from overflow.
pub const MAX_PERIOD: usize = 10_000;

/// Named numeric parameters of a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategySettings(BTreeMap<String, f64>);

impl StrategySettings {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// A finite value for `key`, or `MissingSetting`.
    pub fn require(&self, indicator: &str, key: &str) -> EngineResult<f64> {
        let value = self
            .get(key)
            .ok_or_else(|| EngineError::missing_setting(indicator, key))?;
        if !value.is_finite() {
            return Err(EngineError::invalid_setting(indicator, key, "must be finite"));
        }
        Ok(value)
    }

    pub fn positive(&self, indicator: &str, key: &str) -> EngineResult<f64> {
        let value = self.require(indicator, key)?;
        if value <= 0.0 {
            return Err(EngineError::invalid_setting(
                indicator,
                key,
                format!("must be positive, got {}", value),
            ));
        }
        Ok(value)
    }

    /// A whole number of bars in `1..=MAX_PERIOD`.
    pub fn period(&self, indicator: &str, key: &str) -> EngineResult<usize> {
        let value = self.require(indicator, key)?;
        if value < 1.0 || value.fract() != 0.0 {
            return Err(EngineError::invalid_setting(
                indicator,
                key,
                format!("must be a whole number of bars >= 1, got {}", value),
            ));
        }
        if value > MAX_PERIOD as f64 {
            return Err(EngineError::invalid_setting(
                indicator,
                key,
                format!("must be at most {} bars, got {}", MAX_PERIOD, value),
            ));
        }
        Ok(value as usize)
    }
}

/// Everything a strategy needs besides the candles.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    pub symbol: String,
    pub timeframe: String,
    /// Replaces the strategy defaults entirely when present
    pub settings: Option<StrategySettings>,
    pub levels: LevelConfig,
    pub max_signal_age_bars: usize,
}

impl AnalysisContext {
    pub fn new(symbol: &str, timeframe: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            settings: None,
            levels: LevelConfig::default(),
            max_signal_age_bars: DEFAULT_MAX_SIGNAL_AGE_BARS,
        }
    }

    pub fn with_settings(mut self, settings: StrategySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_levels(mut self, levels: LevelConfig) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_max_signal_age(mut self, bars: usize) -> Self {
        self.max_signal_age_bars = bars;
        self
    }
}

/// Per-bar output of a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    /// +1 buy, -1 sell, 0 none
    pub signals: Vec<i8>,
    /// Confirmation strength in [0, 1], meaningful on signal bars
    pub strength: Vec<f64>,
}

impl StrategyOutput {
    pub fn flat(len: usize) -> Self {
        Self {
            signals: vec![0; len],
            strength: vec![0.0; len],
        }
    }

    pub(crate) fn mark(&mut self, i: usize, signal: i8, strength: f64) {
        self.signals[i] = signal;
        self.strength[i] = clamp_unit(strength);
    }
}

pub trait IndicatorStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Historical hit rate shown alongside the signal.
    fn win_rate(&self) -> f64;

    fn default_settings(&self) -> StrategySettings;

    /// Bars needed before the strategy can emit anything.
    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize>;

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput>;

    fn analyze(&self, series: &CandleSeries, ctx: &AnalysisContext) -> EngineResult<IndicatorResult> {
        let defaults;
        let settings = match &ctx.settings {
            Some(settings) => settings,
            None => {
                defaults = self.default_settings();
                &defaults
            }
        };

        let min_bars = self.min_bars(settings)?;
        if series.len() < min_bars {
            debug!(
                "{} {} {}: {} bars, need {}",
                self.id(),
                ctx.symbol,
                ctx.timeframe,
                series.len(),
                min_bars
            );
            return Ok(IndicatorResult::no_signal(self.id(), series, ctx));
        }

        let output = self.signal_vector(series, settings)?;
        if output.signals.len() != series.len() {
            return Err(EngineError::InvalidSeries(format!(
                "{} produced {} signals for {} bars",
                self.id(),
                output.signals.len(),
                series.len()
            )));
        }
        Ok(IndicatorResult::from_output(self.id(), series, &output, ctx))
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Bars since `predicate` last held, looking back at most `window` bars from `i`.
pub(crate) fn touch_age(window: usize, i: usize, predicate: impl Fn(usize) -> bool) -> Option<usize> {
    (0..window.min(i + 1)).find(|age| predicate(i - age))
}

#[cfg(test)]
pub(crate) mod test_support {
    use common::{Candle, CandleSeries};

    pub const MINUTE: i64 = 60_000;

    pub fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let open = if i == 0 { *close } else { closes[i - 1] };
                Candle {
                    open_time: i as i64 * MINUTE,
                    open,
                    high: open.max(*close) + 0.5,
                    low: open.min(*close) - 0.5,
                    close: *close,
                    volume: 100.0,
                }
            })
            .collect();
        CandleSeries::from_candles(&candles).unwrap()
    }

    /// Falling then rising, with a wiggle so the bands have width.
    pub fn v_shape(len: usize) -> Vec<f64> {
        let half = len / 2;
        (0..len)
            .map(|i| {
                let base = if i < half {
                    200.0 - i as f64 * 2.0
                } else {
                    200.0 - half as f64 * 2.0 + (i - half) as f64 * 3.0
                };
                base + if i % 2 == 0 { 0.8 } else { -0.8 }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_accessors() {
        let settings = StrategySettings::new()
            .with("period", 14.0)
            .with("mult", 2.5)
            .with("bad_period", 2.5)
            .with("zero", 0.0);

        assert_eq!(settings.period("x", "period"), Ok(14));
        assert_eq!(settings.positive("x", "mult"), Ok(2.5));
        assert_eq!(
            settings.require("x", "absent"),
            Err(EngineError::missing_setting("x", "absent"))
        );
        assert!(matches!(
            settings.period("x", "bad_period"),
            Err(EngineError::InvalidSetting { .. })
        ));
        assert!(matches!(
            settings.positive("x", "zero"),
            Err(EngineError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_huge_period_rejected_before_min_bars() {
        let settings = StrategySettings::new().with("period", 1e20).with("edge", MAX_PERIOD as f64);
        assert!(matches!(
            settings.period("x", "period"),
            Err(EngineError::InvalidSetting { .. })
        ));
        assert_eq!(settings.period("x", "edge"), Ok(MAX_PERIOD));

        let macd = MacdBollinger;
        let huge = macd.default_settings().with("slow_period", 1e20).with("signal_period", 1e20);
        assert!(matches!(macd.min_bars(&huge), Err(EngineError::InvalidSetting { .. })));

        let series = test_support::series_from_closes(&test_support::v_shape(40));
        let ctx = AnalysisContext::new("BTCUSDT", "15m").with_settings(huge);
        assert!(macd.analyze(&series, &ctx).is_err());
    }

    #[test]
    fn test_settings_deserialize_from_flat_map() {
        let settings: StrategySettings = serde_json::from_str(r#"{"atr_period": 10, "multiplier": 3.0}"#).unwrap();
        assert_eq!(settings.get("atr_period"), Some(10.0));
        assert_eq!(settings.keys().count(), 2);
    }

    #[test]
    fn test_touch_age() {
        let touched = [false, true, false, false, false];
        assert_eq!(touch_age(5, 4, |j| touched[j]), Some(3));
        assert_eq!(touch_age(3, 4, |j| touched[j]), None);
        assert_eq!(touch_age(10, 0, |j| touched[j]), None);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }
}
