use super::{IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{atr, supertrend, Smoothing};
use common::{CandleSeries, EngineResult};

const ID: &str = "supertrend_flip";

/// Signals when the Supertrend line changes side.
pub struct SupertrendFlip;

struct Params {
    atr_period: usize,
    multiplier: f64,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            atr_period: settings.period(ID, "atr_period")?,
            multiplier: settings.positive(ID, "multiplier")?,
        })
    }
}

impl IndicatorStrategy for SupertrendFlip {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Supertrend Flip"
    }

    fn description(&self) -> &'static str {
        "Buy when the Supertrend turns up, sell when it turns down"
    }

    fn win_rate(&self) -> f64 {
        0.62
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new()
            .with("atr_period", 10.0)
            .with("multiplier", 3.0)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        let params = Params::from_settings(settings)?;
        Ok(params.atr_period + 2)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let params = Params::from_settings(settings)?;
        let (high, low, close) = (series.high(), series.low(), series.close());
        let trend = supertrend(high, low, close, params.atr_period, params.multiplier);
        let range = atr(high, low, close, params.atr_period, Smoothing::Wilder);

        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            let (prev, current) = (trend.direction[i - 1], trend.direction[i]);
            if prev == 0 || prev == current {
                continue;
            }
            // Distance of close from the new stop line, in band widths.
            let strength = match (trend.line[i], range[i]) {
                (Some(line), Some(r)) if r > 0.0 => (close[i] - line).abs() / (params.multiplier * r),
                _ => 0.0,
            };
            out.mark(i, current, 0.5 + 0.5 * strength);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::{series_from_closes, v_shape};

    #[test]
    fn test_flip_on_reversal() {
        let series = series_from_closes(&v_shape(80));
        let settings = SupertrendFlip.default_settings();
        let out = SupertrendFlip.signal_vector(&series, &settings).unwrap();
        let trend = supertrend(series.high(), series.low(), series.close(), 10, 3.0);

        assert!(out.signals[40..].contains(&1));
        for (i, signal) in out.signals.iter().enumerate() {
            if *signal != 0 {
                assert_eq!(trend.direction[i], *signal);
                assert_eq!(trend.direction[i - 1], -*signal);
                assert!(out.strength[i] >= 0.5 && out.strength[i] <= 1.0);
            }
        }
    }

    #[test]
    fn test_min_bars_follows_settings() {
        let settings = StrategySettings::new()
            .with("atr_period", 20.0)
            .with("multiplier", 2.0);
        assert_eq!(SupertrendFlip.min_bars(&settings), Ok(22));
    }
}
