//! In-memory outbox storage for tests and local development
//!
//! Mirrors the Postgres behaviour the relay depends on: inserts and deletes
//! are invisible to others until commit, `lock_pending` skips rows held by
//! another open transaction, and dropping a transaction rolls it back.

use super::{OutboxStore, OutboxTransaction};
use crate::error::{OutboxError, OutboxResult};
use crate::model::{OutboxId, OutboxRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type TxId = u64;

#[derive(Default)]
struct Inner {
    rows: HashMap<OutboxId, OutboxRecord>,
    locks: HashMap<OutboxId, TxId>,
    next_tx: TxId,
}

impl Inner {
    fn release(&mut self, tx: TxId) {
        self.locks.retain(|_, holder| *holder != tx);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Committed records, oldest first
    pub fn records(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<OutboxRecord> = self.lock().rows.values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        records
    }

    pub fn contains(&self, id: OutboxId) -> bool {
        self.lock().rows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows currently locked by open transactions
    pub fn locked_count(&self) -> usize {
        self.lock().locks.len()
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A panic while holding the lock cannot leave Inner half-updated: every
    // mutation below is a single map operation or a loop of them.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> OutboxResult<Self::Tx> {
        let id = {
            let mut inner = self.lock();
            inner.next_tx += 1;
            inner.next_tx
        };

        Ok(InMemoryTransaction {
            id,
            store: Arc::clone(&self.inner),
            inserts: Vec::new(),
            deletes: Vec::new(),
            finished: false,
        })
    }
}

pub struct InMemoryTransaction {
    id: TxId,
    store: Arc<Mutex<Inner>>,
    inserts: Vec<OutboxRecord>,
    deletes: Vec<OutboxId>,
    finished: bool,
}

impl InMemoryTransaction {
    fn insert(&mut self, record: &OutboxRecord) -> OutboxResult<()> {
        let exists = lock_inner(&self.store).rows.contains_key(&record.id)
            || self.inserts.iter().any(|r| r.id == record.id);
        if exists {
            return Err(OutboxError::Storage(format!(
                "duplicate key value violates unique constraint: outbox id {}",
                record.id
            )));
        }

        self.inserts.push(record.clone());
        Ok(())
    }

    fn claim(&mut self, limit: usize) -> Vec<OutboxRecord> {
        let mut inner = lock_inner(&self.store);
        let tx = self.id;

        let mut candidates: Vec<OutboxRecord> = inner
            .rows
            .values()
            .filter(|r| !self.deletes.contains(&r.id))
            .filter(|r| inner.locks.get(&r.id).map_or(true, |holder| *holder == tx))
            .cloned()
            .chain(self.inserts.iter().cloned())
            .collect();
        candidates.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        candidates.truncate(limit);

        for record in &candidates {
            if inner.rows.contains_key(&record.id) {
                inner.locks.insert(record.id, tx);
            }
        }

        candidates
    }

    fn delete(&mut self, ids: &[OutboxId]) -> OutboxResult<u64> {
        let mut inner = lock_inner(&self.store);
        let tx = self.id;
        let mut affected = 0;

        for id in ids {
            if let Some(pos) = self.inserts.iter().position(|r| r.id == *id) {
                self.inserts.remove(pos);
                affected += 1;
                continue;
            }
            if !inner.rows.contains_key(id) || self.deletes.contains(id) {
                continue;
            }
            match inner.locks.get(id) {
                Some(holder) if *holder != tx => {
                    return Err(OutboxError::Storage(format!(
                        "could not obtain lock on outbox row {}",
                        id
                    )));
                }
                _ => {
                    inner.locks.insert(*id, tx);
                    self.deletes.push(*id);
                    affected += 1;
                }
            }
        }

        Ok(affected)
    }

    fn apply(&mut self) {
        let mut inner = lock_inner(&self.store);
        for record in self.inserts.drain(..) {
            inner.rows.insert(record.id, record);
        }
        for id in self.deletes.drain(..) {
            inner.rows.remove(&id);
        }
        inner.release(self.id);
        self.finished = true;
    }

    fn abort(&mut self) {
        self.inserts.clear();
        self.deletes.clear();
        lock_inner(&self.store).release(self.id);
        self.finished = true;
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

#[async_trait]
impl OutboxTransaction for InMemoryTransaction {
    async fn insert_record(&mut self, record: &OutboxRecord) -> OutboxResult<()> {
        self.insert(record)
    }

    async fn lock_pending(&mut self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        Ok(self.claim(limit))
    }

    async fn delete_records(&mut self, ids: &[OutboxId]) -> OutboxResult<u64> {
        self.delete(ids)
    }

    async fn commit(mut self) -> OutboxResult<()> {
        self.apply();
        Ok(())
    }

    async fn rollback(mut self) -> OutboxResult<()> {
        self.abort();
        Ok(())
    }
}
