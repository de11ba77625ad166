use crate::relay::OutboxRelay;
use crate::store::OutboxStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Drive `relay` on its configured interval until `shutdown` flips to `true`
///
/// Every interval fire spawns its own tick, so a tick that overruns the
/// interval is met by the next fire and skipped by the relay's guard rather
/// than queued behind it. On shutdown every spawned tick is awaited, including
/// one fired in the same iteration that observed the shutdown.
pub async fn run_relay<S: OutboxStore>(
    relay: Arc<OutboxRelay<S>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let config = *relay.config();
    tracing::info!(
        interval_secs = config.interval.as_secs_f64(),
        batch_size = config.batch_size,
        publish_timeout_ms = config.publish_timeout.as_millis() as u64,
        "Starting outbox relay"
    );

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                while ticks.try_join_next().is_some() {}

                let relay = Arc::clone(&relay);
                ticks.spawn(async move {
                    relay.tick().await;
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    while let Some(joined) = ticks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Outbox tick task failed");
        }
    }
    tracing::info!("Outbox relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::store::{InMemoryOutboxStore, OutboxTransaction};
    use event_bus::InMemoryBus;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_relays_until_shutdown() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let bus = InMemoryBus::new();
        let mut events = bus.subscribe(">");

        let relay = Arc::new(OutboxRelay::new(
            store.clone(),
            Arc::new(bus.clone()),
            RelayConfig::default(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay(relay, shutdown_rx));

        let mut tx = store.begin().await.unwrap();
        crate::append(&mut tx, "course.published", json!({ "course_id": "c1" }))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // Picked up by the tick fired one interval later.
        tokio::time::sleep(Duration::from_secs(11)).await;

        let msg = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg.event_type, "course.published");
        assert!(store.is_empty());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_tick_fired_alongside_it() {
        // Shutdown and the first interval fire are ready together, so either
        // select arm may win. Whichever does, no tick may outlive run_relay.
        for _ in 0..20 {
            let store = Arc::new(InMemoryOutboxStore::new());
            let mut tx = store.begin().await.unwrap();
            crate::append(&mut tx, "course.published", json!({ "course_id": "c1" }))
                .await
                .unwrap();
            tx.commit().await.unwrap();

            let relay = Arc::new(OutboxRelay::new(
                store.clone(),
                Arc::new(InMemoryBus::new()),
                RelayConfig::default(),
            ));

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            shutdown_tx.send(true).unwrap();
            run_relay(Arc::clone(&relay), shutdown_rx).await;

            let remaining = store.len();
            assert!(!relay.is_ticking());

            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(store.len(), remaining, "a tick ran after run_relay returned");
        }
    }
}
