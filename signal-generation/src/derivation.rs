//! Signal state derived from a per-bar signal vector.

use common::{LevelConfig, SignalType, Timeframe};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SIGNAL_AGE_BARS: usize = 3;

/// Highest index holding a non-zero signal.
pub fn last_signal_index(signals: &[i8]) -> Option<usize> {
    signals.iter().rposition(|s| *s != 0)
}

pub fn bars_since_signal(signals: &[i8]) -> Option<usize> {
    last_signal_index(signals).map(|i| signals.len() - 1 - i)
}

pub fn is_fresh(bars_since_signal: Option<usize>, max_age_bars: usize) -> bool {
    matches!(bars_since_signal, Some(age) if age <= max_age_bars)
}

/// Edge trigger: the current bar signals and the bar before it did not.
pub fn is_new_signal(signals: &[i8]) -> bool {
    match signals {
        [.., prev, current] => *current != 0 && *prev == 0,
        _ => false,
    }
}

/// Age in minutes, unknown when the timeframe cannot be parsed.
pub fn signal_age_minutes(bars_since_signal: usize, timeframe: &str) -> Option<u64> {
    Timeframe::parse(timeframe).map(|tf| bars_since_signal as u64 * tf.minutes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub current_signal: Option<SignalType>,
    pub last_signal: Option<SignalType>,
    pub last_signal_index: Option<usize>,
    pub bars_since_signal: Option<usize>,
    pub is_fresh: bool,
    pub new_signal: bool,
}

pub fn derive_state(signals: &[i8], max_age_bars: usize) -> SignalState {
    let last_index = last_signal_index(signals);
    let bars_since = bars_since_signal(signals);
    SignalState {
        current_signal: signals.last().copied().and_then(SignalType::from_value),
        last_signal: last_index.and_then(|i| SignalType::from_value(signals[i])),
        last_signal_index: last_index,
        bars_since_signal: bars_since,
        is_fresh: is_fresh(bars_since, max_age_bars),
        new_signal: is_new_signal(signals),
    }
}

/// Entry, stop and ordered targets of a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalLevels {
    pub entry: f64,
    pub stop_loss: f64,
    /// Nearest target first
    pub targets: Vec<f64>,
}

/// Direction-aware levels from percent tables.
///
/// No ordering checks happen here; tables are validated when configuration is loaded.
pub fn build_levels(signal: SignalType, entry: f64, levels: &LevelConfig) -> SignalLevels {
    let (stop_loss, targets) = match signal {
        SignalType::Buy => (
            entry * (1.0 - levels.sl_pct),
            levels.tp_pcts.iter().map(|pct| entry * (1.0 + pct)).collect(),
        ),
        SignalType::Sell => (
            entry * (1.0 + levels.sl_pct),
            levels.tp_pcts.iter().map(|pct| entry * (1.0 - pct)).collect(),
        ),
    };
    SignalLevels {
        entry,
        stop_loss,
        targets,
    }
}
