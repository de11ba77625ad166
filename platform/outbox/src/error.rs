use thiserror::Error;

pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid event type: {0:?}")]
    InvalidEventType(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
