// Signal lifecycle
// Persistence, pending queue, verification, outcome tracking and
// at-most-once notification around the indicator engine

pub mod dedup;
pub mod finalize;
pub mod notifier;
pub mod outcome_tracker;
pub mod postgres;
pub mod queue;
pub mod scanner;
pub mod storage;
pub mod summary;
pub mod verification;

pub use dedup::{NotificationGate, NotifyOutcome};
pub use finalize::{history_from_queued, history_from_result};
pub use notifier::{format_signal_message, LogNotifier, Notifier, RecordingNotifier, TelegramNotifier};
pub use outcome_tracker::OutcomeTracker;
pub use postgres::PgSignalStore;
pub use queue::{candle_close_time, select_candle, PendingQueue};
pub use scanner::SignalScanner;
pub use storage::{DedupStore, InMemoryStore, InsertOutcome, SignalStore};
pub use summary::{BatchSummary, ItemReport, ItemStatus};
pub use verification::{closest_candle, CandleMatch, Verifier};
