//! NATS-based implementation of the EventBus trait

use crate::{BusError, BusResult, EventBus};
use async_nats::Client;
use async_trait::async_trait;

/// EventBus implementation using NATS
///
/// The production implementation. It wraps an `async_nats::Client` and
/// publishes each event as JSON bytes on a subject derived from the event
/// type: `{prefix}.{event_type}`, or just `{event_type}` without a prefix.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client).with_subject_prefix("lms.events");
///
/// // Lands on "lms.events.user.created"
/// bus.publish("user.created", &serde_json::json!({ "id": "u1" })).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    subject_prefix: Option<String>,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            subject_prefix: None,
        }
    }

    /// Prepend `prefix` to every published subject
    ///
    /// An empty prefix (or one made only of dots) is the same as no prefix.
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('.');
        self.subject_prefix = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn subject_for(&self, event_type: &str) -> BusResult<String> {
        if event_type.is_empty() || event_type.contains(char::is_whitespace) {
            return Err(BusError::InvalidSubject(event_type.to_string()));
        }

        Ok(match &self.subject_prefix {
            Some(prefix) => format!("{}.{}", prefix, event_type),
            None => event_type.to_string(),
        })
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, event_type: &str, payload: &serde_json::Value) -> BusResult<()> {
        let subject = self.subject_for(event_type)?;
        let bytes = serde_json::to_vec(payload)?;

        self.client
            .publish(subject, bytes.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        // Surface connection problems as a publish failure instead of
        // leaving the event sitting in the client's write buffer.
        self.client
            .flush()
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        Ok(())
    }
}
