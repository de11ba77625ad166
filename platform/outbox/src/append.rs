//! Outbox append API
//!
//! Business code records an event in the same transaction as the change it
//! describes. The record commits or rolls back together with that change;
//! nothing is published here.
//!
//! ```rust,no_run
//! use outbox_relay::append;
//! use serde_json::json;
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), outbox_relay::OutboxError> {
//! let mut tx = pool.begin().await?;
//!
//! sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
//!     .bind("u1")
//!     .bind("ada@example.com")
//!     .execute(&mut *tx)
//!     .await?;
//!
//! append(&mut tx, "user.created", json!({ "id": "u1" })).await?;
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{OutboxError, OutboxResult};
use crate::model::{OutboxId, OutboxRecord};
use crate::store::OutboxTransaction;
use serde::Serialize;

pub const MAX_EVENT_TYPE_LEN: usize = 255;

/// Stage an event inside the caller's open transaction
///
/// Any error must abort the caller's transaction: committing the business
/// change without its event is exactly what the outbox exists to prevent.
pub async fn append<T>(
    tx: &mut T,
    event_type: &str,
    payload: serde_json::Value,
) -> OutboxResult<OutboxId>
where
    T: OutboxTransaction,
{
    validate_event_type(event_type)?;

    let record = OutboxRecord::new(event_type, payload);
    tx.insert_record(&record).await?;

    tracing::debug!(
        outbox_id = %record.id,
        event_type = %record.event_type,
        "Event staged in outbox"
    );

    Ok(record.id)
}

/// Serialize `event` to JSON and [`append`] it
pub async fn append_event<T, E>(tx: &mut T, event_type: &str, event: &E) -> OutboxResult<OutboxId>
where
    T: OutboxTransaction,
    E: Serialize + ?Sized,
{
    let payload = serde_json::to_value(event)?;
    append(tx, event_type, payload).await
}

/// Event types are routing keys: non-empty, bounded, no whitespace
pub fn validate_event_type(event_type: &str) -> OutboxResult<()> {
    if event_type.is_empty()
        || event_type.len() > MAX_EVENT_TYPE_LEN
        || event_type.contains(char::is_whitespace)
    {
        return Err(OutboxError::InvalidEventType(event_type.to_string()));
    }
    Ok(())
}
