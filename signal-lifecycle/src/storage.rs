// Signal persistence interface
// History records, the pending queue and notification dedup markers

use anyhow::{bail, Result};
use common::{
    now_ms, DedupKey, Outcome, QueueStatus, SignalHistoryRecord, SignalQueueRecord, SignalType,
    VerificationStatus,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of a uniqueness-guarded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Storage for finalized signals and the pending queue
#[async_trait::async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert unless a record with the same natural key exists.
    async fn insert_history(&self, record: &SignalHistoryRecord) -> Result<InsertOutcome>;

    async fn get_history(&self, id: Uuid) -> Result<Option<SignalHistoryRecord>>;

    /// Records still awaiting verification, oldest entry first.
    async fn list_active(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>>;

    /// Records whose outcome is still `NONE`, oldest entry first.
    async fn list_ungraded(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>>;

    /// Write a terminal outcome. Returns false when the record was already graded.
    async fn record_outcome(&self, id: Uuid, outcome: Outcome, price: f64, exit_time: i64) -> Result<bool>;

    /// Move an ACTIVE record to MATCHED/NOT_FOUND. Returns false when it was no longer ACTIVE.
    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        exchange_candle_time: Option<i64>,
    ) -> Result<bool>;

    /// Stage a record unless an identical PENDING one exists.
    async fn enqueue(&self, record: &SignalQueueRecord) -> Result<InsertOutcome>;

    async fn get_queued(&self, id: Uuid) -> Result<Option<SignalQueueRecord>>;

    /// PENDING records whose candle has closed by `now_ms`.
    async fn due_queue(&self, now_ms: i64, limit: usize) -> Result<Vec<SignalQueueRecord>>;

    async fn mark_processed(&self, id: Uuid, now_ms: i64) -> Result<()>;

    async fn mark_failed(&self, id: Uuid, error: &str, now_ms: i64) -> Result<()>;

    /// Requeue FAILED records. Returns how many were reset.
    async fn reset_failed(&self, now_ms: i64) -> Result<usize>;
}

/// Notification markers with an atomic first-writer-wins claim
#[async_trait::async_trait]
pub trait DedupStore: Send + Sync {
    /// True when this caller created the marker.
    async fn claim(&self, key: &DedupKey) -> Result<bool>;

    async fn release(&self, key: &DedupKey) -> Result<()>;
}

type QueueKey = (String, String, SignalType, String, i64);

fn queue_key(record: &SignalQueueRecord) -> QueueKey {
    (
        record.symbol.clone(),
        record.timeframe.clone(),
        record.signal_type,
        record.indicator.clone(),
        record.signal_time,
    )
}

/// In-memory store (for testing and dry runs)
pub struct InMemoryStore {
    history: RwLock<HashMap<Uuid, SignalHistoryRecord>>,
    queue: RwLock<HashMap<Uuid, SignalQueueRecord>>,
    markers: DashMap<DedupKey, i64>,
    fail_writes: AtomicBool,
    fail_releases: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            queue: RwLock::new(HashMap::new()),
            markers: DashMap::new(),
            fail_writes: AtomicBool::new(false),
            fail_releases: AtomicBool::new(false),
        }
    }

    /// Make history inserts fail, simulating an unavailable database.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    pub fn has_marker(&self, key: &DedupKey) -> bool {
        self.markers.contains_key(key)
    }

    pub async fn history(&self) -> Vec<SignalHistoryRecord> {
        let mut records: Vec<_> = self.history.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.entry_time, r.created_at));
        records
    }

    pub async fn queued(&self) -> Vec<SignalQueueRecord> {
        let mut records: Vec<_> = self.queue.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.signal_time, r.created_at));
        records
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SignalStore for InMemoryStore {
    async fn insert_history(&self, record: &SignalHistoryRecord) -> Result<InsertOutcome> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("history store unavailable");
        }
        let mut history = self.history.write().await;
        let key = record.natural_key();
        if history.values().any(|r| r.natural_key() == key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        history.insert(record.id, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_history(&self, id: Uuid) -> Result<Option<SignalHistoryRecord>> {
        Ok(self.history.read().await.get(&id).cloned())
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>> {
        let mut records: Vec<_> = self
            .history
            .read()
            .await
            .values()
            .filter(|r| r.status == VerificationStatus::Active)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.entry_time);
        records.truncate(limit);
        Ok(records)
    }

    async fn list_ungraded(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>> {
        let mut records: Vec<_> = self
            .history
            .read()
            .await
            .values()
            .filter(|r| r.outcome == Outcome::None)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.entry_time);
        records.truncate(limit);
        Ok(records)
    }

    async fn record_outcome(&self, id: Uuid, outcome: Outcome, price: f64, exit_time: i64) -> Result<bool> {
        let mut history = self.history.write().await;
        let Some(record) = history.get_mut(&id) else {
            bail!("signal {} not found", id);
        };
        if record.outcome.is_terminal() {
            return Ok(false);
        }
        record.outcome = outcome;
        record.outcome_price = Some(price);
        record.exit_time = Some(exit_time);
        Ok(true)
    }

    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        exchange_candle_time: Option<i64>,
    ) -> Result<bool> {
        let mut history = self.history.write().await;
        let Some(record) = history.get_mut(&id) else {
            bail!("signal {} not found", id);
        };
        if record.status != VerificationStatus::Active {
            return Ok(false);
        }
        record.status = status;
        record.exchange_candle_time = exchange_candle_time;
        Ok(true)
    }

    async fn enqueue(&self, record: &SignalQueueRecord) -> Result<InsertOutcome> {
        let mut queue = self.queue.write().await;
        let key = queue_key(record);
        if queue
            .values()
            .any(|r| r.status == QueueStatus::Pending && queue_key(r) == key)
        {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        queue.insert(record.id, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_queued(&self, id: Uuid) -> Result<Option<SignalQueueRecord>> {
        Ok(self.queue.read().await.get(&id).cloned())
    }

    async fn due_queue(&self, now_ms: i64, limit: usize) -> Result<Vec<SignalQueueRecord>> {
        let mut due: Vec<_> = self
            .queue
            .read()
            .await
            .values()
            .filter(|r| r.is_due(now_ms))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.candle_close_time);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_processed(&self, id: Uuid, now_ms: i64) -> Result<()> {
        let mut queue = self.queue.write().await;
        let Some(record) = queue.get_mut(&id) else {
            bail!("queued signal {} not found", id);
        };
        record.status = QueueStatus::Processed;
        record.error_message = None;
        record.attempts += 1;
        record.updated_at = now_ms;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, now_ms: i64) -> Result<()> {
        let mut queue = self.queue.write().await;
        let Some(record) = queue.get_mut(&id) else {
            bail!("queued signal {} not found", id);
        };
        record.status = QueueStatus::Failed;
        record.error_message = Some(error.to_string());
        record.attempts += 1;
        record.updated_at = now_ms;
        Ok(())
    }

    async fn reset_failed(&self, now_ms: i64) -> Result<usize> {
        let mut queue = self.queue.write().await;
        let pending: Vec<QueueKey> = queue
            .values()
            .filter(|r| r.status == QueueStatus::Pending)
            .map(queue_key)
            .collect();
        let mut reset = 0;
        for record in queue.values_mut() {
            if record.status == QueueStatus::Failed && !pending.contains(&queue_key(record)) {
                record.status = QueueStatus::Pending;
                record.updated_at = now_ms;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[async_trait::async_trait]
impl DedupStore for InMemoryStore {
    async fn claim(&self, key: &DedupKey) -> Result<bool> {
        match self.markers.entry(key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(now_ms());
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &DedupKey) -> Result<()> {
        if self.fail_releases.load(Ordering::SeqCst) {
            bail!("dedup store unavailable");
        }
        self.markers.remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use common::{Outcome, QueueStatus, SignalHistoryRecord, SignalQueueRecord, SignalType, VerificationStatus};
    use uuid::Uuid;

    pub fn history(symbol: &str, entry_time: i64) -> SignalHistoryRecord {
        SignalHistoryRecord {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe: "15m".to_string(),
            signal_type: SignalType::Buy,
            indicator: "supertrend_flip".to_string(),
            entry_price: 100.0,
            targets: vec![101.0, 103.0],
            stop_loss: 95.0,
            outcome: Outcome::None,
            outcome_price: None,
            entry_time,
            exit_time: None,
            is_fresh: true,
            volume_confirmed: false,
            status: VerificationStatus::Active,
            exchange_candle_time: None,
            created_at: entry_time,
        }
    }

    pub fn queued(symbol: &str, signal_time: i64, candle_close_time: i64) -> SignalQueueRecord {
        SignalQueueRecord {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe: "15m".to_string(),
            signal_type: SignalType::Buy,
            indicator: "supertrend_flip".to_string(),
            observed_price: 100.0,
            targets: vec![101.0, 103.0],
            stop_loss: 95.0,
            is_fresh: true,
            volume_confirmed: false,
            signal_time,
            candle_close_time,
            status: QueueStatus::Pending,
            error_message: None,
            attempts: 0,
            created_at: signal_time,
            updated_at: signal_time,
        }
    }
}
