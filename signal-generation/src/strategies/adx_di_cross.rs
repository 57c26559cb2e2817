use super::{IndicatorStrategy, StrategyOutput, StrategySettings};
use crate::series::{adx, crossed_above, crossed_below, Smoothing};
use common::{CandleSeries, EngineResult};

const ID: &str = "adx_di_cross";

/// Directional indicator cross while ADX reports a trending market.
pub struct AdxDiCross;

struct Params {
    period: usize,
    adx_threshold: f64,
}

impl Params {
    fn from_settings(settings: &StrategySettings) -> EngineResult<Self> {
        Ok(Self {
            period: settings.period(ID, "period")?,
            adx_threshold: settings.positive(ID, "adx_threshold")?,
        })
    }
}

impl IndicatorStrategy for AdxDiCross {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "ADX DI Cross"
    }

    fn description(&self) -> &'static str {
        "+DI crosses -DI while ADX is above the trend threshold"
    }

    fn win_rate(&self) -> f64 {
        0.57
    }

    fn default_settings(&self) -> StrategySettings {
        StrategySettings::new()
            .with("period", 14.0)
            .with("adx_threshold", 25.0)
    }

    fn min_bars(&self, settings: &StrategySettings) -> EngineResult<usize> {
        let p = Params::from_settings(settings)?;
        Ok(2 * p.period + 1)
    }

    fn signal_vector(&self, series: &CandleSeries, settings: &StrategySettings) -> EngineResult<StrategyOutput> {
        let p = Params::from_settings(settings)?;
        let dmi = adx(series.high(), series.low(), series.close(), p.period, Smoothing::Wilder);

        let mut out = StrategyOutput::flat(series.len());
        for i in 1..series.len() {
            let Some(trend) = dmi.adx[i] else {
                continue;
            };
            if trend < p.adx_threshold {
                continue;
            }
            let signal = if crossed_above(&dmi.plus_di, &dmi.minus_di, i) {
                1
            } else if crossed_below(&dmi.plus_di, &dmi.minus_di, i) {
                -1
            } else {
                continue;
            };
            out.mark(i, signal, trend / 50.0);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::{series_from_closes, v_shape};

    #[test]
    fn test_buy_cross_after_downtrend_reverses() {
        let series = series_from_closes(&v_shape(80));
        let out = AdxDiCross
            .signal_vector(&series, &AdxDiCross.default_settings())
            .unwrap();
        let dmi = adx(series.high(), series.low(), series.close(), 14, Smoothing::Wilder);

        let buy = out.signals.iter().position(|s| *s == 1).expect("a buy cross");
        assert!(buy > 40);
        assert!(dmi.adx[buy].unwrap() >= 25.0);
        assert!(dmi.plus_di[buy].unwrap() > dmi.minus_di[buy].unwrap());
    }

    #[test]
    fn test_threshold_filters_crosses() {
        let series = series_from_closes(&v_shape(80));
        let settings = AdxDiCross.default_settings().with("adx_threshold", 101.0);
        let out = AdxDiCross.signal_vector(&series, &settings).unwrap();
        assert!(out.signals.iter().all(|s| *s == 0));
    }
}
