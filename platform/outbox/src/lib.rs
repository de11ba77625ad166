//! # Transactional outbox
//!
//! Events are written to an `outbox_events` table in the same transaction as
//! the business change they describe ([`append`]), and a background
//! [`OutboxRelay`] moves them to the [`event_bus::EventBus`]. Relays on
//! several instances can share one table: batches are claimed with
//! `FOR UPDATE SKIP LOCKED`, so they split the work instead of queueing on
//! each other's locks.

pub mod append;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod relay;
pub mod scheduler;
pub mod store;

pub use append::{append, append_event};
pub use config::{BusType, Config, PoolConfig, RelayConfig};
pub use error::{OutboxError, OutboxResult};
pub use model::{OutboxId, OutboxRecord};
pub use relay::{OutboxRelay, PublishFailure, TickOutcome};
pub use scheduler::run_relay;
pub use store::{InMemoryOutboxStore, OutboxStore, OutboxTransaction, PgOutboxStore};
