use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single OHLCV bar. `open_time` is the bar's open in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Index-aligned OHLCV columns, oldest bar first.
///
/// The columns are private so a series can only be built through the checked
/// constructors and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandleSeries {
    t: Vec<i64>,
    o: Vec<f64>,
    h: Vec<f64>,
    l: Vec<f64>,
    c: Vec<f64>,
    v: Vec<f64>,
}

impl CandleSeries {
    pub fn new(
        t: Vec<i64>,
        o: Vec<f64>,
        h: Vec<f64>,
        l: Vec<f64>,
        c: Vec<f64>,
        v: Vec<f64>,
    ) -> EngineResult<Self> {
        let n = t.len();
        let lengths = [o.len(), h.len(), l.len(), c.len(), v.len()];
        if lengths.iter().any(|&len| len != n) {
            return Err(EngineError::InvalidSeries(format!(
                "column lengths differ: t={} o={} h={} l={} c={} v={}",
                n, lengths[0], lengths[1], lengths[2], lengths[3], lengths[4]
            )));
        }
        if t.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidSeries(
                "open times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { t, o, h, l, c, v })
    }

    pub fn from_candles(candles: &[Candle]) -> EngineResult<Self> {
        Self::new(
            candles.iter().map(|c| c.open_time).collect(),
            candles.iter().map(|c| c.open).collect(),
            candles.iter().map(|c| c.high).collect(),
            candles.iter().map(|c| c.low).collect(),
            candles.iter().map(|c| c.close).collect(),
            candles.iter().map(|c| c.volume).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn times(&self) -> &[i64] {
        &self.t
    }

    pub fn open(&self) -> &[f64] {
        &self.o
    }

    pub fn high(&self) -> &[f64] {
        &self.h
    }

    pub fn low(&self) -> &[f64] {
        &self.l
    }

    pub fn close(&self) -> &[f64] {
        &self.c
    }

    pub fn volume(&self) -> &[f64] {
        &self.v
    }

    pub fn candle(&self, index: usize) -> Option<Candle> {
        if index >= self.len() {
            return None;
        }
        Some(Candle {
            open_time: self.t[index],
            open: self.o[index],
            high: self.h[index],
            low: self.l[index],
            close: self.c[index],
            volume: self.v[index],
        })
    }

    pub fn last(&self) -> Option<Candle> {
        self.len().checked_sub(1).and_then(|i| self.candle(i))
    }

    /// Position of the bar whose open time equals `open_time`.
    pub fn index_of(&self, open_time: i64) -> Option<usize> {
        self.t.binary_search(&open_time).ok()
    }
}

/// Signal direction. The flat state is represented by the absence of a
/// signal (`Option<SignalType>` / a zero in a signal vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn from_value(value: i8) -> Option<Self> {
        match value.signum() {
            1 => Some(SignalType::Buy),
            -1 => Some(SignalType::Sell),
            _ => None,
        }
    }

    pub fn value(self) -> i8 {
        match self {
            SignalType::Buy => 1,
            SignalType::Sell => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(SignalType::Buy),
            "SELL" => Ok(SignalType::Sell),
            other => Err(EngineError::Configuration(format!(
                "unknown signal type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeframeUnit {
    fn minutes(self) -> u64 {
        match self {
            TimeframeUnit::Minute => 1,
            TimeframeUnit::Hour => 60,
            TimeframeUnit::Day => 60 * 24,
            TimeframeUnit::Week => 60 * 24 * 7,
        }
    }

    fn suffix(self) -> char {
        match self {
            TimeframeUnit::Minute => 'm',
            TimeframeUnit::Hour => 'h',
            TimeframeUnit::Day => 'd',
            TimeframeUnit::Week => 'w',
        }
    }
}

/// Bar interval written as a count with a unit suffix: `1m`, `15m`, `4h`, `1d`, `1w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    count: u32,
    unit: TimeframeUnit,
}

impl Timeframe {
    /// Lenient parse, `None` when the string is not a supported timeframe.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let suffix = s.chars().last()?;
        let unit = match suffix {
            'm' => TimeframeUnit::Minute,
            'h' => TimeframeUnit::Hour,
            'd' => TimeframeUnit::Day,
            'w' => TimeframeUnit::Week,
            _ => return None,
        };
        let count: u32 = s[..s.len() - suffix.len_utf8()].parse().ok()?;
        if count == 0 {
            return None;
        }
        Some(Self { count, unit })
    }

    pub fn minutes(&self) -> u64 {
        self.count as u64 * self.unit.minutes()
    }

    pub fn interval_ms(&self) -> i64 {
        self.minutes() as i64 * 60_000
    }

    /// Open time of the bar containing `time_ms`.
    pub fn bar_open(&self, time_ms: i64) -> i64 {
        let interval = self.interval_ms();
        time_ms.div_euclid(interval) * interval
    }

    /// Scheduled close of the bar containing `time_ms`.
    pub fn bar_close(&self, time_ms: i64) -> i64 {
        self.bar_open(time_ms) + self.interval_ms()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::parse(s).ok_or_else(|| EngineError::InvalidTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!(Timeframe::parse("15m").unwrap().minutes(), 15);
        assert_eq!(Timeframe::parse("4h").unwrap().minutes(), 240);
        assert_eq!(Timeframe::parse("1d").unwrap().minutes(), 1440);
        assert_eq!(Timeframe::parse("1w").unwrap().minutes(), 10080);
        assert!(Timeframe::parse("15").is_none());
        assert!(Timeframe::parse("0m").is_none());
        assert!(Timeframe::parse("1M").is_none());
        assert!(Timeframe::parse("").is_none());
        assert!("abc".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::parse("4h").unwrap().to_string(), "4h");
    }

    #[test]
    fn test_bar_close_for_fifteen_minutes() {
        let tf = Timeframe::parse("15m").unwrap();
        // 2024-01-01 10:07:00 UTC
        let signal_time = 1_704_103_620_000;
        // 2024-01-01 10:15:00 UTC
        assert_eq!(tf.bar_close(signal_time), 1_704_104_100_000);
        assert_eq!(tf.bar_open(signal_time), 1_704_103_200_000);
    }

    #[test]
    fn test_series_rejects_mismatched_columns() {
        let result = CandleSeries::new(
            vec![1, 2],
            vec![1.0, 2.0],
            vec![1.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
        );
        assert!(matches!(result, Err(EngineError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_lookup() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle {
                open_time: i * 60_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            })
            .collect();
        let series = CandleSeries::from_candles(&candles).unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series.index_of(120_000), Some(2));
        assert_eq!(series.index_of(130_000), None);
        assert_eq!(series.last().unwrap().open_time, 240_000);
    }

    #[test]
    fn test_signal_type_values() {
        assert_eq!(SignalType::from_value(1), Some(SignalType::Buy));
        assert_eq!(SignalType::from_value(-1), Some(SignalType::Sell));
        assert_eq!(SignalType::from_value(0), None);
        assert_eq!("sell".parse::<SignalType>().unwrap(), SignalType::Sell);
    }
}
