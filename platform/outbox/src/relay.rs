//! Outbox relay
//!
//! One [`OutboxRelay::tick`] drains a batch of pending records into the event
//! bus:
//!
//! 1. Skip if this instance is already mid-tick.
//! 2. Open a transaction and lock up to `batch_size` of the oldest rows with
//!    skip-locked semantics, so sibling instances claim disjoint batches and
//!    never wait on each other.
//! 3. Publish each record in order. Failures are logged and left in place.
//! 4. Delete the delivered records and commit once.
//!
//! A crash between publish and commit redelivers the batch, so delivery is
//! at-least-once and consumers must deduplicate.

use crate::config::RelayConfig;
use crate::model::{OutboxId, OutboxRecord};
use crate::store::{OutboxStore, OutboxTransaction};
use crate::OutboxResult;
use event_bus::{BusError, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick on this instance was still running
    Skipped,
    /// No claimable records
    Idle,
    /// Batch committed; `published` rows were deleted, `failed` remain pending
    Dispatched { published: usize, failed: usize },
    /// Could not open the transaction or lock a batch; nothing was touched
    FetchFailed,
    /// Dispatch ran but the delete/commit did not; every row stays pending
    CommitFailed,
}

/// Why one record could not be handed to the bus
#[derive(Debug, thiserror::Error)]
pub enum PublishFailure {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

pub struct OutboxRelay<S: OutboxStore> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    config: RelayConfig,
    // Single permit: at most one tick per instance. Cross-instance exclusion
    // is the store's row locks, never this.
    in_flight: Semaphore,
}

impl<S: OutboxStore> OutboxRelay<S> {
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, config: RelayConfig) -> Self {
        Self {
            store,
            bus,
            config,
            in_flight: Semaphore::new(1),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether a tick is currently running on this instance
    pub fn is_ticking(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    pub async fn tick(&self) -> TickOutcome {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            debug!("Previous outbox tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Failed to open outbox relay transaction");
                return TickOutcome::FetchFailed;
            }
        };

        let records = match tx.lock_pending(self.config.batch_size).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to lock pending outbox batch");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Outbox relay rollback failed");
                }
                return TickOutcome::FetchFailed;
            }
        };

        if records.is_empty() {
            return match tx.commit().await {
                Ok(()) => {
                    trace!("No pending outbox events");
                    TickOutcome::Idle
                }
                Err(e) => {
                    error!(error = %e, "Failed to commit empty outbox relay transaction");
                    TickOutcome::CommitFailed
                }
            };
        }

        let mut delivered: Vec<OutboxId> = Vec::with_capacity(records.len());
        let mut failed = 0;

        for record in &records {
            match self.dispatch(record).await {
                Ok(()) => {
                    trace!(
                        outbox_id = %record.id,
                        event_type = %record.event_type,
                        "Outbox event published"
                    );
                    delivered.push(record.id);
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        outbox_id = %record.id,
                        event_type = %record.event_type,
                        error = %e,
                        "Failed to publish outbox event, will retry on a later tick"
                    );
                }
            }
        }

        if let Err(e) = Self::finish(tx, &delivered).await {
            error!(
                error = %e,
                published = delivered.len(),
                "Failed to commit outbox relay batch, delivered events will be redelivered"
            );
            return TickOutcome::CommitFailed;
        }

        if !delivered.is_empty() {
            info!(published = delivered.len(), failed, "Outbox batch relayed");
        }

        TickOutcome::Dispatched {
            published: delivered.len(),
            failed,
        }
    }

    async fn dispatch(&self, record: &OutboxRecord) -> Result<(), PublishFailure> {
        let publish = self.bus.publish(&record.event_type, &record.payload);
        match tokio::time::timeout(self.config.publish_timeout, publish).await {
            Ok(result) => result.map_err(PublishFailure::from),
            Err(_) => Err(PublishFailure::Timeout(self.config.publish_timeout)),
        }
    }

    async fn finish(mut tx: S::Tx, delivered: &[OutboxId]) -> OutboxResult<()> {
        if let Err(e) = tx.delete_records(delivered).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Outbox relay rollback failed");
            }
            return Err(e);
        }
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOutboxStore;
    use async_trait::async_trait;
    use event_bus::{BusResult, InMemoryBus};
    use serde_json::json;

    struct HangingBus;

    #[async_trait]
    impl EventBus for HangingBus {
        async fn publish(&self, _event_type: &str, _payload: &serde_json::Value) -> BusResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    async fn seed_one(store: &InMemoryOutboxStore, event_type: &str) -> OutboxId {
        let mut tx = store.begin().await.unwrap();
        let id = crate::append(&mut tx, event_type, json!({ "id": "u1" }))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_idle_tick_on_empty_store() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let relay = OutboxRelay::new(store, Arc::new(InMemoryBus::new()), RelayConfig::default());

        assert_eq!(relay.tick().await, TickOutcome::Idle);
        assert!(!relay.is_ticking());
    }

    #[tokio::test]
    async fn test_tick_delivers_and_deletes() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let id = seed_one(&store, "user.created").await;
        let relay = OutboxRelay::new(
            store.clone(),
            Arc::new(InMemoryBus::new()),
            RelayConfig::default(),
        );

        assert_eq!(
            relay.tick().await,
            TickOutcome::Dispatched {
                published: 1,
                failed: 0,
            }
        );
        assert!(!store.contains(id));
        assert_eq!(store.locked_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_keeps_record() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let id = seed_one(&store, "user.created").await;
        let config = RelayConfig {
            publish_timeout: Duration::from_millis(100),
            ..RelayConfig::default()
        };
        let relay = OutboxRelay::new(store.clone(), Arc::new(HangingBus), config);

        assert_eq!(
            relay.tick().await,
            TickOutcome::Dispatched {
                published: 0,
                failed: 1,
            }
        );
        assert!(store.contains(id));
        assert_eq!(store.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_after_tick() {
        let store = Arc::new(InMemoryOutboxStore::new());
        seed_one(&store, "user.created").await;
        let relay = OutboxRelay::new(store, Arc::new(InMemoryBus::new()), RelayConfig::default());

        relay.tick().await;
        assert!(!relay.is_ticking());
        assert_eq!(relay.tick().await, TickOutcome::Idle);
    }
}
