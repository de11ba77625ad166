use crate::config::PoolConfig;
use crate::error::OutboxResult;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize a connection pool to the PostgreSQL database
///
/// Each relay tick holds one connection for the lifetime of its transaction,
/// and business writers appending events hold their own. Size the pool for
/// both.
pub async fn init_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
}

/// Create or update the `outbox_events` table
pub async fn run_migrations(pool: &PgPool) -> OutboxResult<()> {
    sqlx::migrate!("./db/migrations").run(pool).await?;
    Ok(())
}
