use super::{IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{bollinger, crossed_above_level, crossed_below_level, known, rsi, sma, within};
use common::{CandleSeries, EngineResult};

const ID: &str = "rsi_volume_bollinger";

/// RSI leaving an extreme on a volume spike, with price at a band edge.
pub struct RsiVolumeBollinger;

struct Params {
    rsi_period: usize,
    oversold: f64,
    overbought: f64,
    bb_period: usize,
    bb_mult: f64,
    touch_window: usize,
    volume_period: usize,
    volume_mult: f64,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            rsi_period: settings.period(ID, "rsi_period")?,
            oversold: settings.require(ID, "oversold")?,
            overbought: settings.require(ID, "overbought")?,
            bb_period: settings.period(ID, "bb_period")?,
            bb_mult: settings.positive(ID, "bb_mult")?,
            touch_window: settings.period(ID, "touch_window")?,
            volume_period: settings.period(ID, "volume_period")?,
            volume_mult: settings.positive(ID, "volume_mult")?,
        })
    }
}

impl IndicatorStrategy for RsiVolumeBollinger {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "RSI + Volume + Bollinger"
    }

    fn description(&self) -> &'static str {
        "RSI recovers from an extreme on above-average volume after a Bollinger band tag"
    }

    fn win_rate(&self) -> f64 {
        0.71
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new()
            .with("rsi_period", 14.0)
            .with("oversold", 30.0)
            .with("overbought", 70.0)
            .with("bb_period", 20.0)
            .with("bb_mult", 2.0)
            .with("touch_window", 3.0)
            .with("volume_period", 20.0)
            .with("volume_mult", 1.5)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        let p = Params::from_settings(settings)?;
        Ok(p.rsi_period.max(p.bb_period).max(p.volume_period) + 2)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let p = Params::from_settings(settings)?;
        let (close, volume) = (series.close(), series.volume());
        let strength_index = rsi(close, p.rsi_period);
        let bands = bollinger(&known(close), p.bb_period, p.bb_mult);
        let volume_avg = sma(&known(volume), p.volume_period);

        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            let Some(avg) = volume_avg[i] else {
                continue;
            };
            let threshold = p.volume_mult * avg;
            if volume[i] <= threshold {
                continue;
            }

            let signal = if crossed_above_level(&strength_index, p.oversold, i)
                && within(p.touch_window, i, |j| matches!(bands.lower[j], Some(lb) if close[j] <= lb))
            {
                1
            } else if crossed_below_level(&strength_index, p.overbought, i)
                && within(p.touch_window, i, |j| matches!(bands.upper[j], Some(ub) if close[j] >= ub))
            {
                -1
            } else {
                continue;
            };

            let surge = if threshold > 0.0 { volume[i] / threshold - 1.0 } else { 1.0 };
            out.mark(i, signal, 0.5 + 0.5 * surge);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Candle;

    #[test]
    fn test_buy_on_oversold_recovery_with_volume() {
        let mut closes: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 100.2 } else { 99.8 })
            .collect();
        closes.extend([98.0, 96.0, 94.0, 92.0, 95.0]);
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: i as i64 * 60_000,
                open: *close,
                high: close + 0.1,
                low: close - 0.1,
                close: *close,
                volume: if i == 64 { 500.0 } else { 100.0 },
            })
            .collect();
        let series = CandleSeries::from_candles(&candles).unwrap();

        let out = RsiVolumeBollinger
            .signal_vector(&series, &RsiVolumeBollinger.default_settings())
            .unwrap();
        assert_eq!(out.signals[64], 1);
        assert_eq!(out.signals.iter().filter(|s| **s != 0).count(), 1);
    }

    #[test]
    fn test_no_signal_without_volume() {
        let mut closes: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 100.2 } else { 99.8 })
            .collect();
        closes.extend([98.0, 96.0, 94.0, 92.0, 95.0]);
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: i as i64 * 60_000,
                open: *close,
                high: close + 0.1,
                low: close - 0.1,
                close: *close,
                volume: 100.0,
            })
            .collect();
        let series = CandleSeries::from_candles(&candles).unwrap();

        let out = RsiVolumeBollinger
            .signal_vector(&series, &RsiVolumeBollinger.default_settings())
            .unwrap();
        assert!(out.signals.iter().all(|s| *s == 0));
    }
}
