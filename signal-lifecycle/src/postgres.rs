use crate::storage::{DedupStore, InsertOutcome, SignalStore};
use anyhow::{Context, Result};
use common::{DedupKey, Outcome, SignalHistoryRecord, SignalQueueRecord, VerificationStatus};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// PostgreSQL-backed signal store
pub struct PgSignalStore {
    db_pool: Arc<PgPool>,
}

impl PgSignalStore {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }

    /// Create the signal tables
    pub async fn initialize(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS signal_history (
                id UUID PRIMARY KEY,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                indicator TEXT NOT NULL,
                entry_price DOUBLE PRECISION NOT NULL,
                targets DOUBLE PRECISION[] NOT NULL,
                stop_loss DOUBLE PRECISION NOT NULL,
                outcome TEXT NOT NULL DEFAULT 'NONE',
                outcome_price DOUBLE PRECISION,
                entry_time BIGINT NOT NULL,
                exit_time BIGINT,
                is_fresh BOOLEAN NOT NULL,
                volume_confirmed BOOLEAN NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                exchange_candle_time BIGINT,
                created_at BIGINT NOT NULL,
                UNIQUE (symbol, timeframe, signal_type, indicator, entry_time)
            );

            CREATE INDEX IF NOT EXISTS idx_signal_history_status ON signal_history(status);
            CREATE INDEX IF NOT EXISTS idx_signal_history_outcome ON signal_history(outcome);
            "#,
        )
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to create signal_history table")?;

        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS signal_queue (
                id UUID PRIMARY KEY,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                indicator TEXT NOT NULL,
                observed_price DOUBLE PRECISION NOT NULL,
                targets DOUBLE PRECISION[] NOT NULL,
                stop_loss DOUBLE PRECISION NOT NULL,
                is_fresh BOOLEAN NOT NULL,
                volume_confirmed BOOLEAN NOT NULL,
                signal_time BIGINT NOT NULL,
                candle_close_time BIGINT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                error_message TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_signal_queue_pending
                ON signal_queue(symbol, timeframe, signal_type, indicator, signal_time)
                WHERE status = 'PENDING';
            CREATE INDEX IF NOT EXISTS idx_signal_queue_due ON signal_queue(status, candle_close_time);
            "#,
        )
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to create signal_queue table")?;

        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS signal_dedup (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                signal_time BIGINT NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                PRIMARY KEY (symbol, timeframe, signal_type, signal_time)
            );
            "#,
        )
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to create signal_dedup table")?;

        info!("Signal tables initialized");
        Ok(())
    }
}

fn history_from_row(row: &PgRow) -> Result<SignalHistoryRecord> {
    let signal_type: String = row.try_get("signal_type")?;
    let outcome: String = row.try_get("outcome")?;
    let status: String = row.try_get("status")?;
    Ok(SignalHistoryRecord {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        timeframe: row.try_get("timeframe")?,
        signal_type: signal_type.parse()?,
        indicator: row.try_get("indicator")?,
        entry_price: row.try_get("entry_price")?,
        targets: row.try_get("targets")?,
        stop_loss: row.try_get("stop_loss")?,
        outcome: outcome.parse()?,
        outcome_price: row.try_get("outcome_price")?,
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        is_fresh: row.try_get("is_fresh")?,
        volume_confirmed: row.try_get("volume_confirmed")?,
        status: status.parse()?,
        exchange_candle_time: row.try_get("exchange_candle_time")?,
        created_at: row.try_get("created_at")?,
    })
}

fn queued_from_row(row: &PgRow) -> Result<SignalQueueRecord> {
    let signal_type: String = row.try_get("signal_type")?;
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("attempts")?;
    Ok(SignalQueueRecord {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        timeframe: row.try_get("timeframe")?,
        signal_type: signal_type.parse()?,
        indicator: row.try_get("indicator")?,
        observed_price: row.try_get("observed_price")?,
        targets: row.try_get("targets")?,
        stop_loss: row.try_get("stop_loss")?,
        is_fresh: row.try_get("is_fresh")?,
        volume_confirmed: row.try_get("volume_confirmed")?,
        signal_time: row.try_get("signal_time")?,
        candle_close_time: row.try_get("candle_close_time")?,
        status: status.parse()?,
        error_message: row.try_get("error_message")?,
        attempts: attempts.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait::async_trait]
impl SignalStore for PgSignalStore {
    async fn insert_history(&self, record: &SignalHistoryRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO signal_history (
                id, symbol, timeframe, signal_type, indicator, entry_price, targets, stop_loss,
                outcome, outcome_price, entry_time, exit_time, is_fresh, volume_confirmed,
                status, exchange_candle_time, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.symbol)
        .bind(&record.timeframe)
        .bind(record.signal_type.as_str())
        .bind(&record.indicator)
        .bind(record.entry_price)
        .bind(&record.targets)
        .bind(record.stop_loss)
        .bind(record.outcome.as_str())
        .bind(record.outcome_price)
        .bind(record.entry_time)
        .bind(record.exit_time)
        .bind(record.is_fresh)
        .bind(record.volume_confirmed)
        .bind(record.status.as_str())
        .bind(record.exchange_candle_time)
        .bind(record.created_at)
        .execute(self.db_pool.as_ref())
        .await
        .with_context(|| format!("Failed to store signal {} {}", record.symbol, record.timeframe))?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        })
    }

    async fn get_history(&self, id: Uuid) -> Result<Option<SignalHistoryRecord>> {
        let row = sqlx::query("SELECT * FROM signal_history WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db_pool.as_ref())
            .await
            .context("Failed to fetch signal")?;
        row.as_ref().map(history_from_row).transpose()
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM signal_history WHERE status = 'ACTIVE' ORDER BY entry_time LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.db_pool.as_ref())
        .await
        .context("Failed to fetch active signals")?;
        rows.iter().map(history_from_row).collect()
    }

    async fn list_ungraded(&self, limit: usize) -> Result<Vec<SignalHistoryRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM signal_history WHERE outcome = 'NONE' ORDER BY entry_time LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.db_pool.as_ref())
        .await
        .context("Failed to fetch ungraded signals")?;
        rows.iter().map(history_from_row).collect()
    }

    async fn record_outcome(&self, id: Uuid, outcome: Outcome, price: f64, exit_time: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE signal_history
            SET outcome = $1, outcome_price = $2, exit_time = $3
            WHERE id = $4 AND outcome = 'NONE'
            "#,
        )
        .bind(outcome.as_str())
        .bind(price)
        .bind(exit_time)
        .bind(id)
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to record signal outcome")?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        exchange_candle_time: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE signal_history
            SET status = $1, exchange_candle_time = $2
            WHERE id = $3 AND status = 'ACTIVE'
            "#,
        )
        .bind(status.as_str())
        .bind(exchange_candle_time)
        .bind(id)
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to record verification")?;
        Ok(result.rows_affected() == 1)
    }

    async fn enqueue(&self, record: &SignalQueueRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO signal_queue (
                id, symbol, timeframe, signal_type, indicator, observed_price, targets, stop_loss,
                is_fresh, volume_confirmed, signal_time, candle_close_time, status, error_message,
                attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.symbol)
        .bind(&record.timeframe)
        .bind(record.signal_type.as_str())
        .bind(&record.indicator)
        .bind(record.observed_price)
        .bind(&record.targets)
        .bind(record.stop_loss)
        .bind(record.is_fresh)
        .bind(record.volume_confirmed)
        .bind(record.signal_time)
        .bind(record.candle_close_time)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .bind(record.attempts as i32)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.db_pool.as_ref())
        .await
        .with_context(|| format!("Failed to queue signal {} {}", record.symbol, record.timeframe))?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        })
    }

    async fn get_queued(&self, id: Uuid) -> Result<Option<SignalQueueRecord>> {
        let row = sqlx::query("SELECT * FROM signal_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db_pool.as_ref())
            .await
            .context("Failed to fetch queued signal")?;
        row.as_ref().map(queued_from_row).transpose()
    }

    async fn due_queue(&self, now_ms: i64, limit: usize) -> Result<Vec<SignalQueueRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signal_queue
            WHERE status = 'PENDING' AND candle_close_time <= $1
            ORDER BY candle_close_time
            LIMIT $2
            "#,
        )
        .bind(now_ms)
        .bind(limit as i64)
        .fetch_all(self.db_pool.as_ref())
        .await
        .context("Failed to fetch due queue")?;
        rows.iter().map(queued_from_row).collect()
    }

    async fn mark_processed(&self, id: Uuid, now_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE signal_queue
            SET status = 'PROCESSED', error_message = NULL, attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now_ms)
        .bind(id)
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to mark queued signal processed")?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, now_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE signal_queue
            SET status = 'FAILED', error_message = $1, attempts = attempts + 1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(error)
        .bind(now_ms)
        .bind(id)
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to mark queued signal failed")?;
        Ok(())
    }

    async fn reset_failed(&self, now_ms: i64) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE signal_queue AS q
            SET status = 'PENDING', updated_at = $1
            WHERE q.status = 'FAILED'
              AND NOT EXISTS (
                SELECT 1 FROM signal_queue p
                WHERE p.status = 'PENDING'
                  AND p.symbol = q.symbol
                  AND p.timeframe = q.timeframe
                  AND p.signal_type = q.signal_type
                  AND p.indicator = q.indicator
                  AND p.signal_time = q.signal_time
              )
            "#,
        )
        .bind(now_ms)
        .execute(self.db_pool.as_ref())
        .await
        .context("Failed to reset failed queue entries")?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait::async_trait]
impl DedupStore for PgSignalStore {
    async fn claim(&self, key: &DedupKey) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO signal_dedup (symbol, timeframe, signal_type, signal_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&key.symbol)
        .bind(&key.timeframe)
        .bind(key.signal_type.as_str())
        .bind(key.signal_time)
        .execute(self.db_pool.as_ref())
        .await
        .with_context(|| format!("Failed to claim notification {}", key))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &DedupKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM signal_dedup
            WHERE symbol = $1 AND timeframe = $2 AND signal_type = $3 AND signal_time = $4
            "#,
        )
        .bind(&key.symbol)
        .bind(&key.timeframe)
        .bind(key.signal_type.as_str())
        .bind(key.signal_time)
        .execute(self.db_pool.as_ref())
        .await
        .with_context(|| format!("Failed to release notification {}", key))?;
        Ok(())
    }
}
