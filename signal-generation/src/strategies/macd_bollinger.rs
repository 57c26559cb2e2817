use super::{touch_age, IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{bollinger, crossed_above_level, crossed_below_level, known, macd};
use common::{CandleSeries, EngineResult};

const ID: &str = "macd_bollinger";

/// MACD histogram zero cross confirmed by a recent Bollinger band touch.
pub struct MacdBollinger;

struct Params {
    fast: usize,
    slow: usize,
    signal: usize,
    bb_period: usize,
    bb_mult: f64,
    touch_window: usize,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            fast: settings.period(ID, "fast_period")?,
            slow: settings.period(ID, "slow_period")?,
            signal: settings.period(ID, "signal_period")?,
            bb_period: settings.period(ID, "bb_period")?,
            bb_mult: settings.positive(ID, "bb_mult")?,
            touch_window: settings.period(ID, "touch_window")?,
        })
    }
}

impl IndicatorStrategy for MacdBollinger {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "MACD + Bollinger"
    }

    fn description(&self) -> &'static str {
        "MACD histogram crosses zero shortly after price tagged the opposite Bollinger band"
    }

    fn win_rate(&self) -> f64 {
        0.66
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new()
            .with("fast_period", 12.0)
            .with("slow_period", 26.0)
            .with("signal_period", 9.0)
            .with("bb_period", 20.0)
            .with("bb_mult", 2.0)
            .with("touch_window", 5.0)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        let p = Params::from_settings(settings)?;
        Ok((p.slow.max(p.fast) + p.signal).max(p.bb_period) + 1)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let p = Params::from_settings(settings)?;
        let (high, low, close) = (series.high(), series.low(), series.close());
        let hist = macd(close, p.fast, p.slow, p.signal).histogram;
        let bands = bollinger(&known(close), p.bb_period, p.bb_mult);

        let lower_touch = |j: usize| matches!(bands.lower[j], Some(lb) if low[j] <= lb);
        let upper_touch = |j: usize| matches!(bands.upper[j], Some(ub) if high[j] >= ub);

        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            let (signal, age) = if crossed_above_level(&hist, 0.0, i) {
                (1, touch_age(p.touch_window, i, lower_touch))
            } else if crossed_below_level(&hist, 0.0, i) {
                (-1, touch_age(p.touch_window, i, upper_touch))
            } else {
                continue;
            };
            let Some(age) = age else {
                continue;
            };

            let recency = 1.0 - age as f64 / p.touch_window as f64;
            // How far close still sits on the touched side of the middle band.
            let placement = match (bands.middle[i], bands.upper[i], bands.lower[i]) {
                (Some(mid), Some(ub), Some(lb)) if ub > lb => {
                    let half = (ub - lb) / 2.0;
                    if signal > 0 {
                        (mid - close[i]) / half
                    } else {
                        (close[i] - mid) / half
                    }
                }
                _ => 0.0,
            };
            out.mark(i, signal, 0.5 + 0.3 * recency + 0.2 * placement.max(0.0));
        }
        Ok(out)
    }
}
