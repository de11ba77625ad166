//! Shared doubles for relay tests
//!
//! - `RecordingBus`: remembers every publish call, fails for chosen event
//!   types, optionally sleeps to hold a tick open.
//! - `FlakyStore`: wraps `InMemoryOutboxStore`, counts lock/commit/rollback
//!   calls and injects insert, fetch or commit failures.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use event_bus::{BusError, BusResult, EventBus};
use outbox_relay::store::InMemoryTransaction;
use outbox_relay::{
    InMemoryOutboxStore, OutboxError, OutboxId, OutboxRecord, OutboxResult, OutboxStore,
    OutboxTransaction,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Event bus double
// ============================================================================

#[derive(Default)]
pub struct RecordingBus {
    calls: Mutex<Vec<(String, Value)>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, event_type: &str) {
        self.failing.lock().unwrap().insert(event_type.to_string());
    }

    pub fn recover(&self, event_type: &str) {
        self.failing.lock().unwrap().remove(event_type);
    }

    /// Every publish attempt, successful or not, in call order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event_type: &str, payload: &Value) -> BusResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((event_type.to_string(), payload.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(event_type) {
            return Err(BusError::PublishError(format!(
                "consumer for {} unavailable",
                event_type
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Store double
// ============================================================================

#[derive(Default)]
pub struct Probe {
    pub fail_insert: AtomicBool,
    pub fail_lock: AtomicBool,
    pub fail_commit: AtomicBool,
    pub begins: AtomicUsize,
    pub lock_calls: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl Probe {
    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryOutboxStore,
    pub probe: Arc<Probe>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct FlakyTx {
    inner: InMemoryTransaction,
    probe: Arc<Probe>,
}

#[async_trait]
impl OutboxStore for FlakyStore {
    type Tx = FlakyTx;

    async fn begin(&self) -> OutboxResult<Self::Tx> {
        self.probe.begins.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyTx {
            inner: self.inner.begin().await?,
            probe: Arc::clone(&self.probe),
        })
    }
}

#[async_trait]
impl OutboxTransaction for FlakyTx {
    async fn insert_record(&mut self, record: &OutboxRecord) -> OutboxResult<()> {
        if self.probe.fail_insert.load(Ordering::SeqCst) {
            return Err(OutboxError::Storage("disk quota exceeded".into()));
        }
        self.inner.insert_record(record).await
    }

    async fn lock_pending(&mut self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        self.probe.lock_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_lock.load(Ordering::SeqCst) {
            return Err(OutboxError::Storage("connection reset by peer".into()));
        }
        self.inner.lock_pending(limit).await
    }

    async fn delete_records(&mut self, ids: &[OutboxId]) -> OutboxResult<u64> {
        self.inner.delete_records(ids).await
    }

    async fn commit(self) -> OutboxResult<()> {
        if self.probe.fail_commit.load(Ordering::SeqCst) {
            // Dropping the inner transaction rolls it back.
            return Err(OutboxError::Storage("server closed the connection".into()));
        }
        self.probe.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(self) -> OutboxResult<()> {
        self.probe.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

// ============================================================================
// Seeding
// ============================================================================

/// Commit one record per `(event_type, payload)`, `created_at` one millisecond apart
pub async fn seed<S: OutboxStore>(store: &S, events: &[(&str, Value)]) -> Vec<OutboxRecord> {
    let base = Utc::now() - ChronoDuration::minutes(5);
    let records: Vec<OutboxRecord> = events
        .iter()
        .enumerate()
        .map(|(i, (event_type, payload))| {
            OutboxRecord::new(*event_type, payload.clone()).with_created_at(at(base, i))
        })
        .collect();

    let mut tx = store.begin().await.expect("begin");
    for record in &records {
        tx.insert_record(record).await.expect("insert");
    }
    tx.commit().await.expect("commit");
    records
}

fn at(base: DateTime<Utc>, offset_ms: usize) -> DateTime<Utc> {
    base + ChronoDuration::milliseconds(offset_ms as i64)
}
