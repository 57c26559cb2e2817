use super::{IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{ema, heikin_ashi, known};
use common::{CandleSeries, EngineResult};

const ID: &str = "heikin_ashi_trend";

/// Heikin-Ashi colour change in the direction of the EMA trend.
pub struct HeikinAshiTrend;

struct Params {
    ema_period: usize,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            ema_period: settings.period(ID, "ema_period")?,
        })
    }
}

impl IndicatorStrategy for HeikinAshiTrend {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Heikin-Ashi Trend"
    }

    fn description(&self) -> &'static str {
        "Heikin-Ashi candle turns colour on the trend side of the EMA"
    }

    fn win_rate(&self) -> f64 {
        0.60
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new().with("ema_period", 50.0)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        Ok(Params::from_settings(settings)?.ema_period + 1)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let p = Params::from_settings(settings)?;
        let close = series.close();
        let ha = heikin_ashi(series.open(), series.high(), series.low(), close);
        let trend = ema(&known(close), p.ema_period);

        let bullish = |j: usize| ha.close[j] > ha.open[j];
        let bearish = |j: usize| ha.close[j] < ha.open[j];

        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            let Some(average) = trend[i] else {
                continue;
            };
            let signal = if bullish(i) && bearish(i - 1) && close[i] > average {
                1
            } else if bearish(i) && bullish(i - 1) && close[i] < average {
                -1
            } else {
                continue;
            };
            let range = ha.high[i] - ha.low[i];
            let body = if range > 0.0 { (ha.close[i] - ha.open[i]).abs() / range } else { 0.0 };
            out.mark(i, signal, body);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::series_from_closes;

    #[test]
    fn test_buy_when_pullback_ends_above_ema() {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        closes.extend([135.0, 133.0, 140.0]);
        let series = series_from_closes(&closes);
        let settings = StrategySettings::new().with("ema_period", 10.0);

        let out = HeikinAshiTrend.signal_vector(&series, &settings).unwrap();
        assert_eq!(out.signals[40], 0);
        assert_eq!(out.signals[41], 0);
        assert_eq!(out.signals[42], 1);
        assert_eq!(out.signals.iter().filter(|s| **s != 0).count(), 1);
    }
}
