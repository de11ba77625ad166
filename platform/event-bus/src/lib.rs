//! # EventBus Port
//!
//! The outbound side of the transactional outbox. The relay hands every
//! pending outbox record to an [`EventBus`] and only deletes the record once
//! `publish` returns `Ok`. How delivery actually happens (in-process
//! broadcast, NATS, a webhook) is up to the implementation.
//!
//! ## Implementations
//!
//! - **NatsBus**: Production implementation on top of `async_nats`
//! - **InMemoryBus**: Dev/test implementation using a Tokio broadcast channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, InMemoryBus, NatsBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let nats_client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> =
//!     Arc::new(NatsBus::new(nats_client).with_subject_prefix("lms.events"));
//!
//! // Dev/Test: In-Memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! bus.publish("user.created", &serde_json::json!({ "id": "u1" })).await?;
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod nats_bus;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use std::fmt;

/// A message delivered by the in-memory bus to its subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Event kind the message was published under (routing key)
    pub event_type: String,
    /// The event payload, untouched
    pub payload: serde_json::Value,
}

impl BusMessage {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Port the outbox relay publishes through
///
/// Each call is independent: a failure for one record says nothing about the
/// next one, and the relay keeps going through its batch.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event
    ///
    /// # Arguments
    /// * `event_type` - Event kind (e.g., "user.created"), used for routing
    /// * `payload` - The event payload; opaque to the bus
    ///
    /// # Returns
    /// * `Ok(())` once the transport accepted the event
    /// * `Err(BusError)` if it did not; the caller keeps the event for retry
    async fn publish(&self, event_type: &str, payload: &serde_json::Value) -> BusResult<()>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
