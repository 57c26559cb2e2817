//! Series math over candle columns.
//!
//! Every function is a pure transform returning a sequence of the same length
//! as its input. Unknown positions (warm-up or gaps) are `None`.

/// A sequence with optional gaps.
pub type Series = Vec<Option<f64>>;

/// Smoothing used by the averaged range/direction indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    /// `alpha = 2 / (period + 1)`
    Exponential,
    /// `alpha = 1 / period`
    Wilder,
}

impl Smoothing {
    fn alpha(self, period: usize) -> f64 {
        match self {
            Smoothing::Exponential => 2.0 / (period as f64 + 1.0),
            Smoothing::Wilder => 1.0 / period as f64,
        }
    }
}

/// Wrap raw values, mapping non-finite entries to gaps.
pub fn known(values: &[f64]) -> Series {
    values
        .iter()
        .map(|v| if v.is_finite() { Some(*v) } else { None })
        .collect()
}

pub fn sma(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mut sum = 0.0;
        let mut complete = true;
        for v in window {
            match v {
                Some(x) => sum += x,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}

/// Recursive smoothing seeded from the first known value.
///
/// Output stays unknown until `period` samples have been folded in; after
/// that a gap repeats the previous smoothed value.
pub fn smooth(values: &[Option<f64>], period: usize, smoothing: Smoothing) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let alpha = smoothing.alpha(period);
    let mut state: Option<f64> = None;
    let mut samples = 0usize;

    for (i, v) in values.iter().enumerate() {
        if let Some(x) = v {
            state = Some(match state {
                None => *x,
                Some(prev) => alpha * x + (1.0 - alpha) * prev,
            });
            samples += 1;
        }
        if samples >= period {
            out[i] = state;
        }
    }
    out
}

pub fn ema(values: &[Option<f64>], period: usize) -> Series {
    smooth(values, period, Smoothing::Exponential)
}

pub fn wilder(values: &[Option<f64>], period: usize) -> Series {
    smooth(values, period, Smoothing::Wilder)
}

pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                range
            } else {
                let prev_close = close[i - 1];
                range
                    .max((high[i] - prev_close).abs())
                    .max((low[i] - prev_close).abs())
            }
        })
        .collect()
}

pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize, smoothing: Smoothing) -> Series {
    smooth(&known(&true_range(high, low, close)), period, smoothing)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdxOutput {
    pub adx: Series,
    pub plus_di: Series,
    pub minus_di: Series,
}

/// Average directional index with +DI/-DI.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize, smoothing: Smoothing) -> AdxOutput {
    let n = high.len();
    let tr = true_range(high, low, close);
    let mut plus_dm: Series = vec![None; n];
    let mut minus_dm: Series = vec![None; n];
    let mut tr_known: Series = vec![None; n];

    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
        tr_known[i] = Some(tr[i]);
    }

    let smoothed_plus = smooth(&plus_dm, period, smoothing);
    let smoothed_minus = smooth(&minus_dm, period, smoothing);
    let smoothed_tr = smooth(&tr_known, period, smoothing);

    let mut plus_di: Series = vec![None; n];
    let mut minus_di: Series = vec![None; n];
    let mut dx: Series = vec![None; n];
    for i in 0..n {
        if let (Some(p), Some(m), Some(t)) = (smoothed_plus[i], smoothed_minus[i], smoothed_tr[i]) {
            if t > 0.0 {
                let pdi = 100.0 * p / t;
                let mdi = 100.0 * m / t;
                plus_di[i] = Some(pdi);
                minus_di[i] = Some(mdi);
                let sum = pdi + mdi;
                dx[i] = Some(if sum > 0.0 { 100.0 * (pdi - mdi).abs() / sum } else { 0.0 });
            }
        }
    }

    AdxOutput {
        adx: smooth(&dx, period, smoothing),
        plus_di,
        minus_di,
    }
}

/// Wilder RSI.
///
/// Averages are seeded with the simple mean of the first `period` changes. A
/// zero average loss maps RS to 100 rather than infinity.
pub fn rsi(close: &[f64], period: usize) -> Series {
    let n = close.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let change = |i: usize| close[i] - close[i - 1];
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let c = change(i);
        if c > 0.0 {
            avg_gain += c;
        } else {
            avg_loss -= c;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let p = period as f64;
    for i in (period + 1)..n {
        let c = change(i);
        let (gain, loss) = if c > 0.0 { (c, 0.0) } else { (0.0, -c) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
    100.0 - 100.0 / (1.0 + rs)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let values = known(close);
    let fast_ema = ema(&values, fast);
    let slow_ema = ema(&values, slow);
    let line: Series = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal = ema(&line, signal_period);
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();
    MacdOutput {
        macd: line,
        signal,
        histogram,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub middle: Series,
    pub upper: Series,
    pub lower: Series,
}

/// Bollinger bands using the population standard deviation.
pub fn bollinger(values: &[Option<f64>], period: usize, multiplier: f64) -> BollingerBands {
    let middle = sma(values, period);
    let n = values.len();
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];

    for i in 0..n {
        let Some(mean) = middle[i] else {
            continue;
        };
        let variance = values[i + 1 - period..=i]
            .iter()
            .flatten()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / period as f64;
        let width = multiplier * variance.sqrt();
        upper[i] = Some(mean + width);
        lower[i] = Some(mean - width);
    }

    BollingerBands {
        middle,
        upper,
        lower,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendOutput {
    pub line: Series,
    /// +1 uptrend, -1 downtrend, 0 unknown
    pub direction: Vec<i8>,
}

/// Supertrend over a Wilder ATR with ratcheting final bands.
pub fn supertrend(high: &[f64], low: &[f64], close: &[f64], period: usize, multiplier: f64) -> SupertrendOutput {
    let n = close.len();
    let atr = atr(high, low, close, period, Smoothing::Wilder);
    let mut line = vec![None; n];
    let mut direction = vec![0i8; n];

    let mut prev: Option<(f64, f64, i8)> = None;
    for i in 0..n {
        let Some(range) = atr[i] else {
            continue;
        };
        let hl2 = (high[i] + low[i]) / 2.0;
        let basic_upper = hl2 + multiplier * range;
        let basic_lower = hl2 - multiplier * range;

        let (upper, lower, dir) = match prev {
            None => {
                let dir = if close[i] >= hl2 { 1 } else { -1 };
                (basic_upper, basic_lower, dir)
            }
            Some((prev_upper, prev_lower, prev_dir)) => {
                let prev_close = close[i - 1];
                let upper = if basic_upper < prev_upper || prev_close > prev_upper {
                    basic_upper
                } else {
                    prev_upper
                };
                let lower = if basic_lower > prev_lower || prev_close < prev_lower {
                    basic_lower
                } else {
                    prev_lower
                };
                let dir = if prev_dir < 0 && close[i] > upper {
                    1
                } else if prev_dir > 0 && close[i] < lower {
                    -1
                } else {
                    prev_dir
                };
                (upper, lower, dir)
            }
        };

        line[i] = Some(if dir > 0 { lower } else { upper });
        direction[i] = dir;
        prev = Some((upper, lower, dir));
    }

    SupertrendOutput { line, direction }
}

/// On-balance volume starting at zero.
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    let mut total = 0.0;
    for i in 0..close.len() {
        if i > 0 {
            if close[i] > close[i - 1] {
                total += volume[i];
            } else if close[i] < close[i - 1] {
                total -= volume[i];
            }
        }
        out.push(total);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeikinAshi {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

pub fn heikin_ashi(open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> HeikinAshi {
    let n = close.len();
    let mut ha = HeikinAshi {
        open: Vec::with_capacity(n),
        high: Vec::with_capacity(n),
        low: Vec::with_capacity(n),
        close: Vec::with_capacity(n),
    };
    for i in 0..n {
        let ha_close = (open[i] + high[i] + low[i] + close[i]) / 4.0;
        let ha_open = if i == 0 {
            (open[0] + close[0]) / 2.0
        } else {
            (ha.open[i - 1] + ha.close[i - 1]) / 2.0
        };
        ha.high.push(high[i].max(ha_open).max(ha_close));
        ha.low.push(low[i].min(ha_open).min(ha_close));
        ha.open.push(ha_open);
        ha.close.push(ha_close);
    }
    ha
}

/// Bars strictly higher than `left` bars before and `right` bars after.
pub fn pivot_high(high: &[f64], left: usize, right: usize) -> Vec<bool> {
    pivots(high, left, right, |candidate, neighbour| candidate > neighbour)
}

/// Bars strictly lower than `left` bars before and `right` bars after.
pub fn pivot_low(low: &[f64], left: usize, right: usize) -> Vec<bool> {
    pivots(low, left, right, |candidate, neighbour| candidate < neighbour)
}

fn pivots(values: &[f64], left: usize, right: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<bool> {
    let n = values.len();
    let mut out = vec![false; n];
    if n == 0 {
        return out;
    }
    for i in left..n.saturating_sub(right) {
        let candidate = values[i];
        let left_ok = values[i - left..i].iter().all(|&v| beats(candidate, v));
        let right_ok = values[i + 1..=i + right].iter().all(|&v| beats(candidate, v));
        out[i] = left_ok && right_ok;
    }
    out
}

/// `a` moved from at-or-below `b` to above it on bar `i`.
pub fn crossed_above(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    if i == 0 {
        return false;
    }
    match (a[i - 1], b[i - 1], a[i], b[i]) {
        (Some(a0), Some(b0), Some(a1), Some(b1)) => a0 <= b0 && a1 > b1,
        _ => false,
    }
}

/// `a` moved from at-or-above `b` to below it on bar `i`.
pub fn crossed_below(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    if i == 0 {
        return false;
    }
    match (a[i - 1], b[i - 1], a[i], b[i]) {
        (Some(a0), Some(b0), Some(a1), Some(b1)) => a0 >= b0 && a1 < b1,
        _ => false,
    }
}

pub fn crossed_above_level(a: &[Option<f64>], level: f64, i: usize) -> bool {
    if i == 0 {
        return false;
    }
    matches!((a[i - 1], a[i]), (Some(a0), Some(a1)) if a0 <= level && a1 > level)
}

pub fn crossed_below_level(a: &[Option<f64>], level: f64, i: usize) -> bool {
    if i == 0 {
        return false;
    }
    matches!((a[i - 1], a[i]), (Some(a0), Some(a1)) if a0 >= level && a1 < level)
}

/// True when `predicate` holds for any of the `window` bars ending at `i`.
pub fn within(window: usize, i: usize, predicate: impl Fn(usize) -> bool) -> bool {
    let start = (i + 1).saturating_sub(window);
    (start..=i).any(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma_warmup_and_gaps() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0), None, Some(5.0), Some(6.0), Some(7.0)];
        let out = sma(&values, 3);
        assert_eq!(out.len(), values.len());
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        // any window touching the gap is unknown
        assert_eq!(out[3], None);
        assert_eq!(out[5], None);
        assert_eq!(out[6], Some(6.0));
    }

    #[test]
    fn test_ema_seeds_from_first_value_and_holds_through_gaps() {
        let values = vec![None, Some(10.0), Some(20.0), None, Some(20.0)];
        let out = ema(&values, 2);
        let alpha = 2.0 / 3.0;
        let second = alpha * 20.0 + (1.0 - alpha) * 10.0;
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), second));
        assert!(approx(out[3].unwrap(), second));
        assert!(approx(out[4].unwrap(), alpha * 20.0 + (1.0 - alpha) * second));
    }

    #[test]
    fn test_wilder_uses_one_over_period() {
        let values = known(&[10.0, 20.0]);
        let out = wilder(&values, 2);
        assert!(approx(out[1].unwrap(), 0.5 * 20.0 + 0.5 * 10.0));
    }

    #[test]
    fn test_true_range() {
        let high = [10.0, 12.0, 11.0];
        let low = [8.0, 11.0, 7.0];
        let close = [9.0, 11.5, 8.0];
        let tr = true_range(&high, &low, &close);
        assert_eq!(tr, vec![2.0, 3.0, 4.5]);
    }

    #[test]
    fn test_rsi_rising_series_stays_bounded_and_approaches_100() {
        let close: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&close, 14);
        assert_eq!(out.len(), 20);
        for value in out.iter().take(14) {
            assert!(value.is_none());
        }
        for value in out.iter().skip(14) {
            let v = value.unwrap();
            assert!((0.0..=100.0).contains(&v));
            assert!(v > 99.0);
        }
    }

    #[test]
    fn test_rsi_falling_series_is_zero() {
        let close: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&close, 14);
        assert!(approx(out[19].unwrap(), 0.0));
    }

    #[test]
    fn test_rsi_is_within_bounds_on_mixed_series() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + ((i as f64) * 0.7).sin() * 5.0).collect();
        for value in rsi(&close, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_bollinger_population_std() {
        let values = known(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let bands = bollinger(&values, 8, 1.0);
        assert!(approx(bands.middle[7].unwrap(), 5.0));
        assert!(approx(bands.upper[7].unwrap(), 7.0));
        assert!(approx(bands.lower[7].unwrap(), 3.0));
        assert_eq!(bands.upper[6], None);
    }

    #[test]
    fn test_macd_lengths_and_warmup() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let out = macd(&close, 12, 26, 9);
        assert_eq!(out.macd.len(), 60);
        assert_eq!(out.macd[24], None);
        assert!(out.macd[25].is_some());
        assert!(out.histogram[59].is_some());
        // steady uptrend keeps the fast average above the slow one
        assert!(out.macd[59].unwrap() > 0.0);
    }

    #[test]
    fn test_heikin_ashi() {
        let ha = heikin_ashi(&[10.0, 12.0], &[13.0, 14.0], &[9.0, 11.0], &[12.0, 13.0]);
        assert!(approx(ha.open[0], 11.0));
        assert!(approx(ha.close[0], 11.0));
        assert!(approx(ha.open[1], 11.0));
        assert!(approx(ha.close[1], 12.5));
        assert!(approx(ha.high[1], 14.0));
        assert!(approx(ha.low[1], 11.0));
    }

    #[test]
    fn test_pivots_exclude_boundaries() {
        let high = [1.0, 3.0, 2.0, 5.0, 2.0, 1.0, 6.0];
        let pivots = pivot_high(&high, 2, 2);
        assert_eq!(pivots, vec![false, false, false, true, false, false, false]);

        let low = [5.0, 4.0, 1.0, 4.0, 5.0];
        assert_eq!(pivot_low(&low, 2, 2), vec![false, false, true, false, false]);

        // equal neighbours are not strictly exceeded
        assert!(!pivot_high(&[1.0, 2.0, 2.0, 1.0], 1, 1).iter().any(|p| *p));
    }

    #[test]
    fn test_obv() {
        let out = obv(&[10.0, 11.0, 11.0, 9.0], &[5.0, 3.0, 4.0, 2.0]);
        assert_eq!(out, vec![0.0, 3.0, 3.0, 1.0]);
    }

    #[test]
    fn test_supertrend_flips_on_reversal() {
        let mut close: Vec<f64> = (0..30).map(|i| 200.0 - i as f64 * 2.0).collect();
        close.extend((0..30).map(|i| 142.0 + i as f64 * 4.0));
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let out = supertrend(&high, &low, &close, 10, 3.0);

        assert!(out.direction[0..9].iter().all(|d| *d == 0));
        assert_eq!(out.direction[29], -1);
        assert_eq!(out.direction[59], 1);
        let flips = out.direction.windows(2).filter(|w| w[0] == -1 && w[1] == 1).count();
        assert_eq!(flips, 1);
    }

    #[test]
    fn test_adx_trending_market() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let out = adx(&high, &low, &close, 14, Smoothing::Wilder);
        assert_eq!(out.adx.len(), 60);
        assert!(out.adx[0].is_none());
        assert!(out.plus_di[59].unwrap() > out.minus_di[59].unwrap());
        assert!(out.adx[59].unwrap() > 25.0);
    }

    #[test]
    fn test_crossings_and_window() {
        let a = known(&[1.0, 2.0, 3.0]);
        let b = known(&[2.0, 2.0, 2.0]);
        assert!(!crossed_above(&a, &b, 1));
        assert!(crossed_above(&a, &b, 2));
        assert!(crossed_below(&b, &a, 2));
        assert!(crossed_above_level(&a, 1.5, 1));
        assert!(within(3, 5, |j| j == 3));
        assert!(!within(2, 5, |j| j == 3));
    }

    #[test]
    fn test_functions_are_deterministic() {
        let close: Vec<f64> = (0..80).map(|i| 50.0 + ((i as f64) * 0.3).cos() * 4.0).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        assert_eq!(rsi(&close, 14), rsi(&close, 14));
        assert_eq!(macd(&close, 12, 26, 9), macd(&close, 12, 26, 9));
        assert_eq!(supertrend(&high, &low, &close, 10, 3.0), supertrend(&high, &low, &close, 10, 3.0));
        assert_eq!(
            adx(&high, &low, &close, 14, Smoothing::Exponential),
            adx(&high, &low, &close, 14, Smoothing::Exponential)
        );
    }
}
