//! Analysis snapshot for the most recent bar.

use crate::derivation::{build_levels, derive_state, signal_age_minutes, SignalLevels};
use crate::grader::{grade, GradedOutcome};
use crate::series::{known, sma};
use crate::strategies::{AnalysisContext, StrategyOutput};
use common::{CandleSeries, SignalType};
use serde::{Deserialize, Serialize};

/// Lookback of the volume average used for volume confirmation.
pub const VOLUME_CONFIRM_PERIOD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl From<Option<SignalType>> for Direction {
    fn from(signal: Option<SignalType>) -> Self {
        match signal {
            Some(SignalType::Buy) => Direction::Bullish,
            Some(SignalType::Sell) => Direction::Bearish,
            None => Direction::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub symbol: String,
    pub timeframe: String,
    pub indicator: String,
    pub current_price: Option<f64>,
    pub current_time: Option<i64>,
    pub current_signal: Option<SignalType>,
    pub last_signal: Option<SignalType>,
    pub last_signal_index: Option<usize>,
    pub last_signal_time: Option<i64>,
    pub last_signal_price: Option<f64>,
    pub bars_since_signal: Option<usize>,
    pub signal_age_minutes: Option<u64>,
    pub is_fresh: bool,
    pub new_signal: bool,
    pub levels: Option<SignalLevels>,
    /// 0..=100
    pub confidence: u8,
    pub outcome: GradedOutcome,
    pub volume_confirmed: bool,
    pub direction: Direction,
}

impl IndicatorResult {
    /// Result for a series too short to evaluate.
    pub fn no_signal(indicator: &str, series: &CandleSeries, ctx: &AnalysisContext) -> Self {
        let last = series.last();
        Self {
            symbol: ctx.symbol.clone(),
            timeframe: ctx.timeframe.clone(),
            indicator: indicator.to_string(),
            current_price: last.map(|c| c.close),
            current_time: last.map(|c| c.open_time),
            current_signal: None,
            last_signal: None,
            last_signal_index: None,
            last_signal_time: None,
            last_signal_price: None,
            bars_since_signal: None,
            signal_age_minutes: None,
            is_fresh: false,
            new_signal: false,
            levels: None,
            confidence: 0,
            outcome: GradedOutcome::open(),
            volume_confirmed: false,
            direction: Direction::Neutral,
        }
    }

    pub fn from_output(indicator: &str, series: &CandleSeries, output: &StrategyOutput, ctx: &AnalysisContext) -> Self {
        let mut result = Self::no_signal(indicator, series, ctx);
        let state = derive_state(&output.signals, ctx.max_signal_age_bars);

        result.current_signal = state.current_signal;
        result.last_signal = state.last_signal;
        result.last_signal_index = state.last_signal_index;
        result.bars_since_signal = state.bars_since_signal;
        result.is_fresh = state.is_fresh;
        result.new_signal = state.new_signal;
        result.direction = Direction::from(state.last_signal);
        result.signal_age_minutes = state
            .bars_since_signal
            .and_then(|bars| signal_age_minutes(bars, &ctx.timeframe));

        if let (Some(index), Some(signal)) = (state.last_signal_index, state.last_signal) {
            let entry = series.close()[index];
            let levels = build_levels(signal, entry, &ctx.levels);
            result.last_signal_time = Some(series.times()[index]);
            result.last_signal_price = Some(entry);
            result.confidence = (output.strength[index] * 100.0).round().clamp(0.0, 100.0) as u8;
            result.volume_confirmed = volume_confirmed(series, index);
            result.outcome = grade(series, index, signal, &levels);
            result.levels = Some(levels);
        }
        result
    }
}

/// Bar volume above its recent average.
pub fn volume_confirmed(series: &CandleSeries, index: usize) -> bool {
    let volume = series.volume();
    let average = sma(&known(volume), VOLUME_CONFIRM_PERIOD);
    matches!(average.get(index), Some(Some(avg)) if volume[index] > *avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::series_from_closes;
    use common::{Candle, LevelConfig, Outcome};

    fn output(signals: Vec<i8>) -> StrategyOutput {
        let strength = signals.iter().map(|s| if *s != 0 { 0.8 } else { 0.0 }).collect();
        StrategyOutput { signals, strength }
    }

    #[test]
    fn test_result_fields_from_signal_vector() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let series = series_from_closes(&closes);
        let mut signals = vec![0i8; 10];
        signals[7] = 1;
        let ctx = AnalysisContext::new("ETHUSDT", "15m").with_levels(LevelConfig {
            sl_pct: 0.05,
            tp_pcts: vec![0.005, 0.01],
        });

        let result = IndicatorResult::from_output("supertrend_flip", &series, &output(signals), &ctx);
        assert_eq!(result.last_signal, Some(SignalType::Buy));
        assert_eq!(result.current_signal, None);
        assert_eq!(result.last_signal_index, Some(7));
        assert_eq!(result.last_signal_time, Some(7 * 60_000));
        assert_eq!(result.last_signal_price, Some(107.0));
        assert_eq!(result.bars_since_signal, Some(2));
        assert_eq!(result.signal_age_minutes, Some(30));
        assert!(result.is_fresh);
        assert!(!result.new_signal);
        assert_eq!(result.confidence, 80);
        assert_eq!(result.direction, Direction::Bullish);
        // bar 8 reaches 108.5 which clears both targets (107.535, 108.07)
        assert_eq!(result.outcome.outcome, Outcome::Tp2);
        assert_eq!(result.outcome.bar_index, Some(8));
        assert_eq!(result.current_price, Some(109.0));
    }

    #[test]
    fn test_flat_vector_is_neutral() {
        let series = series_from_closes(&[1.0, 2.0, 3.0]);
        let ctx = AnalysisContext::new("ETHUSDT", "15m");
        let result = IndicatorResult::from_output("x", &series, &output(vec![0, 0, 0]), &ctx);
        assert_eq!(result.direction, Direction::Neutral);
        assert_eq!(result.levels, None);
        assert_eq!(result.outcome, GradedOutcome::open());
    }

    #[test]
    fn test_volume_confirmation() {
        let candles: Vec<Candle> = (0..25)
            .map(|i| Candle {
                open_time: i * 60_000,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: if i == 24 { 300.0 } else { 100.0 },
            })
            .collect();
        let series = CandleSeries::from_candles(&candles).unwrap();
        assert!(volume_confirmed(&series, 24));
        assert!(!volume_confirmed(&series, 23));
        assert!(!volume_confirmed(&series, 5));
    }

    #[test]
    fn test_serializes_for_presentation() {
        let series = series_from_closes(&[1.0, 2.0, 3.0]);
        let ctx = AnalysisContext::new("ETHUSDT", "15m");
        let result = IndicatorResult::from_output("x", &series, &output(vec![0, 0, -1]), &ctx);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["last_signal"], "SELL");
        assert_eq!(json["direction"], "BEARISH");
        assert_eq!(json["new_signal"], true);
    }
}
