//! Persisted signal records and their status enums.
//!
//! All timestamps are epoch milliseconds (`i64`).

use crate::errors::EngineError;
use crate::types::SignalType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of take-profit levels attached to a signal.
pub const MAX_TARGETS: usize = 6;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Which level was touched first after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    None,
    Tp1,
    Tp2,
    Tp3,
    Tp4,
    Tp5,
    Tp6,
    Sl,
}

impl Outcome {
    /// Outcome for the target of the given 1-based rank.
    pub fn target(rank: usize) -> Option<Self> {
        match rank {
            1 => Some(Outcome::Tp1),
            2 => Some(Outcome::Tp2),
            3 => Some(Outcome::Tp3),
            4 => Some(Outcome::Tp4),
            5 => Some(Outcome::Tp5),
            6 => Some(Outcome::Tp6),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Outcome::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::None => "NONE",
            Outcome::Tp1 => "TP1",
            Outcome::Tp2 => "TP2",
            Outcome::Tp3 => "TP3",
            Outcome::Tp4 => "TP4",
            Outcome::Tp5 => "TP5",
            Outcome::Tp6 => "TP6",
            Outcome::Sl => "SL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Outcome::None),
            "TP1" => Ok(Outcome::Tp1),
            "TP2" => Ok(Outcome::Tp2),
            "TP3" => Ok(Outcome::Tp3),
            "TP4" => Ok(Outcome::Tp4),
            "TP5" => Ok(Outcome::Tp5),
            "TP6" => Ok(Outcome::Tp6),
            "SL" => Ok(Outcome::Sl),
            other => Err(EngineError::Configuration(format!("unknown outcome: {}", other))),
        }
    }
}

/// Verification state of a finalized signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Active,
    Matched,
    NotFound,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Active => "ACTIVE",
            VerificationStatus::Matched => "MATCHED",
            VerificationStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(VerificationStatus::Active),
            "MATCHED" => Ok(VerificationStatus::Matched),
            "NOT_FOUND" => Ok(VerificationStatus::NotFound),
            other => Err(EngineError::Configuration(format!(
                "unknown verification status: {}",
                other
            ))),
        }
    }
}

/// Lifecycle of a staged signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueStatus {
    Pending,
    Processed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Processed => "PROCESSED",
            QueueStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QueueStatus::Pending),
            "PROCESSED" => Ok(QueueStatus::Processed),
            "FAILED" => Ok(QueueStatus::Failed),
            other => Err(EngineError::Configuration(format!(
                "unknown queue status: {}",
                other
            ))),
        }
    }
}

/// A finalized signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalHistoryRecord {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: SignalType,
    pub indicator: String,
    pub entry_price: f64,
    pub targets: Vec<f64>,
    pub stop_loss: f64,
    pub outcome: Outcome,
    pub outcome_price: Option<f64>,
    pub entry_time: i64,
    pub exit_time: Option<i64>,
    pub is_fresh: bool,
    pub volume_confirmed: bool,
    pub status: VerificationStatus,
    pub exchange_candle_time: Option<i64>,
    pub created_at: i64,
}

impl SignalHistoryRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.symbol, &self.timeframe, self.signal_type, self.entry_time)
    }

    /// Natural key: one record per indicator occurrence of a signal.
    pub fn natural_key(&self) -> (String, String, SignalType, String, i64) {
        (
            self.symbol.clone(),
            self.timeframe.clone(),
            self.signal_type,
            self.indicator.clone(),
            self.entry_time,
        )
    }
}

/// A signal observed on a bar that had not closed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQueueRecord {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: SignalType,
    pub indicator: String,
    pub observed_price: f64,
    pub targets: Vec<f64>,
    pub stop_loss: f64,
    pub is_fresh: bool,
    pub volume_confirmed: bool,
    pub signal_time: i64,
    pub candle_close_time: i64,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SignalQueueRecord {
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == QueueStatus::Pending && now_ms >= self.candle_close_time
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.symbol, &self.timeframe, self.signal_type, self.signal_time)
    }
}

/// Identity of one signal occurrence for notification dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: SignalType,
    pub signal_time: i64,
}

impl DedupKey {
    pub fn new(symbol: &str, timeframe: &str, signal_type: SignalType, signal_time: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            signal_type,
            signal_time,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.symbol, self.timeframe, self.signal_type, self.signal_time
        )
    }
}
