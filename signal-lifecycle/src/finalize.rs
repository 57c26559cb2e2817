// Building finalized signal records

use anyhow::{anyhow, Result};
use common::{
    Candle, LevelConfig, Outcome, SignalHistoryRecord, SignalQueueRecord, VerificationStatus,
};
use signal_generation::{build_levels, IndicatorResult};
use uuid::Uuid;

/// Record for a signal on an already closed bar.
pub fn history_from_result(result: &IndicatorResult, now_ms: i64) -> Result<SignalHistoryRecord> {
    let missing = || anyhow!("{} {} has no signal to finalize", result.symbol, result.timeframe);
    let signal_type = result.last_signal.ok_or_else(missing)?;
    let levels = result.levels.as_ref().ok_or_else(missing)?;
    let entry_time = result.last_signal_time.ok_or_else(missing)?;

    Ok(SignalHistoryRecord {
        id: Uuid::new_v4(),
        symbol: result.symbol.clone(),
        timeframe: result.timeframe.clone(),
        signal_type,
        indicator: result.indicator.clone(),
        entry_price: levels.entry,
        targets: levels.targets.clone(),
        stop_loss: levels.stop_loss,
        outcome: Outcome::None,
        outcome_price: None,
        entry_time,
        exit_time: None,
        is_fresh: result.is_fresh,
        volume_confirmed: result.volume_confirmed,
        status: VerificationStatus::Active,
        exchange_candle_time: None,
        created_at: now_ms,
    })
}

/// Record for a queued signal, priced from the confirmed candle.
pub fn history_from_queued(
    queued: &SignalQueueRecord,
    candle: &Candle,
    levels: &LevelConfig,
    now_ms: i64,
) -> SignalHistoryRecord {
    let confirmed = build_levels(queued.signal_type, candle.close, levels);
    SignalHistoryRecord {
        id: Uuid::new_v4(),
        symbol: queued.symbol.clone(),
        timeframe: queued.timeframe.clone(),
        signal_type: queued.signal_type,
        indicator: queued.indicator.clone(),
        entry_price: confirmed.entry,
        targets: confirmed.targets,
        stop_loss: confirmed.stop_loss,
        outcome: Outcome::None,
        outcome_price: None,
        entry_time: candle.open_time,
        exit_time: None,
        is_fresh: queued.is_fresh,
        volume_confirmed: queued.volume_confirmed,
        status: VerificationStatus::Active,
        exchange_candle_time: None,
        created_at: now_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::queued;
    use common::SignalType;

    #[test]
    fn test_queued_signal_repriced_from_candle() {
        let record = queued("BTCUSDT", 1_000, 900_000);
        let candle = Candle {
            open_time: 0,
            open: 100.0,
            high: 112.0,
            low: 99.0,
            close: 110.0,
            volume: 5.0,
        };
        let levels = LevelConfig {
            sl_pct: 0.1,
            tp_pcts: vec![0.1],
        };

        let history = history_from_queued(&record, &candle, &levels, 2_000);
        assert_eq!(history.signal_type, SignalType::Buy);
        assert_eq!(history.entry_price, 110.0);
        assert_eq!(history.entry_time, 0);
        assert!((history.stop_loss - 99.0).abs() < 1e-9);
        assert!((history.targets[0] - 121.0).abs() < 1e-9);
        assert_eq!(history.status, VerificationStatus::Active);
        assert_eq!(history.outcome, Outcome::None);
    }
}
