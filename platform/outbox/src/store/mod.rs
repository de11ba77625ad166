//! Outbox record storage
//!
//! The relay and the append API only talk to storage through these two
//! traits. [`OutboxStore`] hands out transactions; everything else happens on
//! an [`OutboxTransaction`], so that an append shares the caller's
//! transaction and the relay's lock/delete/commit cycle is a single unit.
//!
//! - [`PgOutboxStore`]: Postgres, with `FOR UPDATE SKIP LOCKED` row claiming.
//!   `sqlx::Transaction<Postgres>` itself implements [`OutboxTransaction`], so
//!   business code appends on the transaction it already holds.
//! - [`InMemoryOutboxStore`]: process-local store for tests and local runs.
//!   It emulates row locks with skip-on-contention semantics.

mod memory;
mod postgres;

pub use memory::{InMemoryOutboxStore, InMemoryTransaction};
pub use postgres::PgOutboxStore;

use crate::error::OutboxResult;
use crate::model::{OutboxId, OutboxRecord};
use async_trait::async_trait;

/// A live transaction against the outbox table
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back and releases every row lock it holds.
#[async_trait]
pub trait OutboxTransaction: Send {
    /// Stage a new record; it becomes visible to other transactions on commit
    async fn insert_record(&mut self, record: &OutboxRecord) -> OutboxResult<()>;

    /// Lock and return up to `limit` pending records, oldest `created_at` first
    ///
    /// Rows already locked by another open transaction are skipped, never
    /// waited on.
    async fn lock_pending(&mut self, limit: usize) -> OutboxResult<Vec<OutboxRecord>>;

    /// Stage deletion of the given records, returning how many rows matched
    async fn delete_records(&mut self, ids: &[OutboxId]) -> OutboxResult<u64>;

    async fn commit(self) -> OutboxResult<()>;

    async fn rollback(self) -> OutboxResult<()>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync + 'static {
    type Tx: OutboxTransaction + 'static;

    /// Open a new transaction
    async fn begin(&self) -> OutboxResult<Self::Tx>;
}
