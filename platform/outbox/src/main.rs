use event_bus::{EventBus, InMemoryBus, NatsBus};
use outbox_relay::{
    config::{BusType, Config},
    db::{init_pool, run_migrations},
    run_relay, OutboxRelay, PgOutboxStore,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("Failed to load configuration from environment");
    tracing::info!(
        bus_type = ?config.bus_type,
        interval_secs = config.relay.interval.as_secs(),
        batch_size = config.relay.batch_size,
        "Configuration loaded"
    );

    tracing::info!("Connecting to database...");
    let pool = init_pool(&config.database_url, &config.pool)
        .await
        .expect("Failed to connect to database");

    run_migrations(&pool).await.expect("Failed to run migrations");

    let bus: Arc<dyn EventBus> = match config.bus_type {
        BusType::Nats => {
            let nats_url = config.nats_url.as_deref().expect("NATS_URL required for NATS bus");
            tracing::info!("Connecting to NATS at {}", nats_url);
            let client = async_nats::connect(nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client).with_subject_prefix(config.nats_subject_prefix.clone()))
        }
        BusType::InMemory => {
            tracing::info!("Using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
    };

    let store = Arc::new(PgOutboxStore::new(pool));
    match store.pending_count().await {
        Ok(pending) => tracing::info!(pending, "Outbox backlog at startup"),
        Err(e) => tracing::warn!(error = %e, "Could not count pending outbox events"),
    }

    let relay = Arc::new(OutboxRelay::new(store, bus, config.relay));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_relay(relay, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Outbox relay task ended abnormally");
    }
}
