//! Outcome grading: which level a signal touched first.
//!
//! Within one bar the stop is checked before any target, and targets are
//! checked farthest first. A single wide bar therefore reports the stop if it
//! reached it, otherwise the best target it reached. This does not model the
//! real intrabar path; win-rate statistics are computed against this rule.

use crate::derivation::SignalLevels;
use common::{CandleSeries, Outcome, SignalType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedOutcome {
    pub outcome: Outcome,
    pub bar_index: Option<usize>,
    pub price: Option<f64>,
    pub time: Option<i64>,
}

impl GradedOutcome {
    pub fn open() -> Self {
        Self {
            outcome: Outcome::None,
            bar_index: None,
            price: None,
            time: None,
        }
    }
}

/// Scan the bars after `signal_index` and stop at the first touched level.
pub fn grade(
    series: &CandleSeries,
    signal_index: usize,
    signal: SignalType,
    levels: &SignalLevels,
) -> GradedOutcome {
    let high = series.high();
    let low = series.low();

    for i in (signal_index + 1)..series.len() {
        if let Some((outcome, price)) = touched_level(signal, levels, high[i], low[i]) {
            return GradedOutcome {
                outcome,
                bar_index: Some(i),
                price: Some(price),
                time: Some(series.times()[i]),
            };
        }
    }
    GradedOutcome::open()
}

/// The level a single bar resolves to, if any.
pub fn touched_level(signal: SignalType, levels: &SignalLevels, high: f64, low: f64) -> Option<(Outcome, f64)> {
    let stop_hit = match signal {
        SignalType::Buy => low <= levels.stop_loss,
        SignalType::Sell => high >= levels.stop_loss,
    };
    if stop_hit {
        return Some((Outcome::Sl, levels.stop_loss));
    }

    for (rank0, target) in levels.targets.iter().enumerate().rev() {
        let reached = match signal {
            SignalType::Buy => high >= *target,
            SignalType::Sell => low <= *target,
        };
        if reached {
            return Outcome::target(rank0 + 1).map(|outcome| (outcome, *target));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Candle;

    fn series(bars: &[(f64, f64)]) -> CandleSeries {
        let candles: Vec<Candle> = bars
            .iter()
            .enumerate()
            .map(|(i, (high, low))| Candle {
                open_time: i as i64 * 60_000,
                open: (high + low) / 2.0,
                high: *high,
                low: *low,
                close: (high + low) / 2.0,
                volume: 1.0,
            })
            .collect();
        CandleSeries::from_candles(&candles).unwrap()
    }

    fn buy_levels() -> SignalLevels {
        SignalLevels {
            entry: 100.0,
            stop_loss: 95.0,
            targets: vec![101.0, 103.0],
        }
    }

    #[test]
    fn test_stop_checked_before_targets_in_same_bar() {
        let s = series(&[(100.5, 99.5), (104.0, 94.0)]);
        let graded = grade(&s, 0, SignalType::Buy, &buy_levels());
        assert_eq!(graded.outcome, Outcome::Sl);
        assert_eq!(graded.bar_index, Some(1));
        assert_eq!(graded.price, Some(95.0));
        assert_eq!(graded.time, Some(60_000));
    }

    #[test]
    fn test_farthest_target_reported_first() {
        let s = series(&[(100.5, 99.5), (103.5, 99.0)]);
        let graded = grade(&s, 0, SignalType::Buy, &buy_levels());
        assert_eq!(graded.outcome, Outcome::Tp2);
        assert_eq!(graded.price, Some(103.0));
    }

    #[test]
    fn test_first_touching_bar_wins() {
        let s = series(&[(100.5, 99.5), (101.2, 99.0), (90.0, 80.0)]);
        let graded = grade(&s, 0, SignalType::Buy, &buy_levels());
        assert_eq!(graded.outcome, Outcome::Tp1);
        assert_eq!(graded.bar_index, Some(1));
    }

    #[test]
    fn test_signal_bar_itself_is_not_graded() {
        let s = series(&[(110.0, 90.0), (100.5, 99.5)]);
        let graded = grade(&s, 0, SignalType::Buy, &buy_levels());
        assert_eq!(graded, GradedOutcome::open());
    }

    #[test]
    fn test_sell_mirror() {
        let levels = SignalLevels {
            entry: 100.0,
            stop_loss: 105.0,
            targets: vec![99.0, 97.0],
        };
        let s = series(&[(100.5, 99.5), (100.0, 96.5)]);
        assert_eq!(grade(&s, 0, SignalType::Sell, &levels).outcome, Outcome::Tp2);

        let s = series(&[(100.5, 99.5), (106.0, 96.5)]);
        assert_eq!(grade(&s, 0, SignalType::Sell, &levels).outcome, Outcome::Sl);
    }
}
