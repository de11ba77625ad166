//! Postgres-backed outbox storage
//!
//! Expects the `outbox_events` table from `db/migrations`.

use super::{OutboxStore, OutboxTransaction};
use crate::error::OutboxResult;
use crate::model::{OutboxId, OutboxRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxRecord {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: OutboxId(row.id),
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl<'c> OutboxTransaction for Transaction<'c, Postgres> {
    async fn insert_record(&mut self, record: &OutboxRecord) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id.0)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut **self)
        .await?;
        Ok(())
    }

    async fn lock_pending(&mut self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, event_type, payload, created_at
            FROM outbox_events
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut **self)
        .await?;

        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn delete_records(&mut self, ids: &[OutboxId]) -> OutboxResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let uuids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM outbox_events
            WHERE id = ANY($1)
            "#,
        )
        .bind(&uuids)
        .execute(&mut **self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> OutboxResult<()> {
        Transaction::commit(self).await?;
        Ok(())
    }

    async fn rollback(self) -> OutboxResult<()> {
        Transaction::rollback(self).await?;
        Ok(())
    }
}

/// Outbox store over a Postgres connection pool
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Number of undelivered records, locked or not
    pub async fn pending_count(&self) -> OutboxResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outbox_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> OutboxResult<Self::Tx> {
        Ok(self.pool.begin().await?)
    }
}
