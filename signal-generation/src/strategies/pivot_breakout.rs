use super::{IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{known, obv, pivot_high, pivot_low, sma};
use common::{CandleSeries, EngineResult};

const ID: &str = "pivot_breakout";

/// Close breaks the last confirmed pivot with OBV on the same side of its average.
pub struct PivotBreakout;

struct Params {
    left: usize,
    right: usize,
    obv_period: usize,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            left: settings.period(ID, "pivot_left")?,
            right: settings.period(ID, "pivot_right")?,
            obv_period: settings.period(ID, "obv_period")?,
        })
    }
}

impl IndicatorStrategy for PivotBreakout {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Pivot Breakout"
    }

    fn description(&self) -> &'static str {
        "Close breaks the last confirmed pivot high or low with OBV confirmation"
    }

    fn win_rate(&self) -> f64 {
        0.55
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new()
            .with("pivot_left", 5.0)
            .with("pivot_right", 5.0)
            .with("obv_period", 20.0)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        let p = Params::from_settings(settings)?;
        Ok(p.left + p.right + p.obv_period + 1)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let p = Params::from_settings(settings)?;
        let (high, low, close) = (series.high(), series.low(), series.close());
        let highs = pivot_high(high, p.left, p.right);
        let lows = pivot_low(low, p.left, p.right);
        let balance = obv(close, series.volume());
        let balance_avg = sma(&known(&balance), p.obv_period);

        let mut resistance: Option<f64> = None;
        let mut support: Option<f64> = None;
        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            // A pivot is only known `right` bars after it printed.
            if i >= p.right {
                let pivot = i - p.right;
                if highs[pivot] {
                    resistance = Some(high[pivot]);
                }
                if lows[pivot] {
                    support = Some(low[pivot]);
                }
            }
            let Some(avg) = balance_avg[i] else {
                continue;
            };

            let (signal, level) = match (resistance, support) {
                (Some(r), _) if close[i - 1] <= r && close[i] > r && balance[i] > avg => (1, r),
                (_, Some(s)) if close[i - 1] >= s && close[i] < s && balance[i] < avg => (-1, s),
                _ => continue,
            };
            let breakout = (close[i] - level).abs() / level;
            out.mark(i, signal, 0.5 + 50.0 * breakout);
        }
        Ok(out)
    }
}
