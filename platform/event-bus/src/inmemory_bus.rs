//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// EventBus implementation using in-memory channels
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without a broker
/// - Running the relay binary with `BUS_TYPE=inmemory`
///
/// Messages are broadcast to all subscribers via a Tokio broadcast channel.
/// Publishing with no subscribers succeeds and the message is dropped, which
/// matches a fire-and-forget broker with nobody listening.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("user.>");
///
/// bus.publish("user.created", &serde_json::json!({ "id": "u1" })).await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.event_type, "user.created");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus
    ///
    /// The bus uses a broadcast channel with a buffer of 1000 messages.
    /// If this buffer is exceeded, the oldest messages will be dropped.
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a new in-memory event bus with a custom buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to every event whose type matches `pattern`
    ///
    /// Event types are dot-separated tokens. Patterns support NATS-style
    /// wildcards: `*` matches exactly one token, `>` matches the rest.
    pub fn subscribe(&self, pattern: &str) -> BoxStream<'static, BusMessage> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::matches_pattern(&msg.event_type, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            skipped,
                            pattern = %pattern,
                            "InMemoryBus subscriber lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        stream.boxed()
    }

    /// Check if an event type matches a subscription pattern
    ///
    /// # Examples
    /// - `user.>` matches `user.profile.updated`
    /// - `*.created` matches `user.created`
    /// - `user.*` does NOT match `user.profile.updated` (too many tokens)
    fn matches_pattern(event_type: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = event_type.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut s_idx = 0;
        let mut p_idx = 0;

        while s_idx < subject_tokens.len() && p_idx < pattern_tokens.len() {
            match pattern_tokens[p_idx] {
                ">" => return true,
                "*" => {}
                token if token == subject_tokens[s_idx] => {}
                _ => return false,
            }
            s_idx += 1;
            p_idx += 1;
        }

        s_idx == subject_tokens.len() && p_idx == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event_type: &str, payload: &serde_json::Value) -> BusResult<()> {
        let msg = BusMessage::new(event_type, payload.clone());

        // No receivers is fine
        let _ = self.sender.send(msg);

        Ok(())
    }
}
