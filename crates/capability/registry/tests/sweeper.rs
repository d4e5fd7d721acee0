use async_trait::async_trait;
use domain::{CatalogEntry, MeasurementEntity, UnitSpec, now_epoch_ms};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio::sync::Notify;
use vebridge_registry::{
    EntityEvent, EntityObserver, EntityRegistry, NoopObserver, PublishOutcome,
    StalenessSweeper, publish_event,
};
use vebridge_telemetry::LinkMetrics;

#[derive(Default)]
struct RecordingObserver {
    availability: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl EntityObserver for RecordingObserver {
    async fn entity_created(&self, _entity: &MeasurementEntity) -> PublishOutcome {
        PublishOutcome::Published
    }

    async fn entity_updated(&self, _entity: &MeasurementEntity) -> PublishOutcome {
        PublishOutcome::Published
    }

    async fn availability_changed(&self, entity: &MeasurementEntity) -> PublishOutcome {
        self.availability
            .lock()
            .expect("lock")
            .push((entity.unique_id.clone(), entity.available));
        PublishOutcome::NotAttached
    }
}

fn entry(identifier: &str) -> CatalogEntry {
    CatalogEntry {
        identifier: identifier.to_string(),
        description: None,
        group: None,
        sentence_description: "Monitor".to_string(),
        unit: UnitSpec::None,
    }
}

#[tokio::test]
async fn sweep_once_notifies_changed_entities() {
    let registry = Arc::new(EntityRegistry::new());
    registry
        .upsert("TEMP", "23", &entry("TEMP"), None, 0)
        .expect("upsert");
    registry
        .upsert("V", "12800", &entry("V"), None, 250_000)
        .expect("upsert");
    let observer = Arc::new(RecordingObserver::default());
    let metrics = Arc::new(LinkMetrics::new());
    let sweeper = StalenessSweeper::new(
        "victron",
        registry.clone(),
        observer.clone(),
        Duration::from_secs(300),
        Duration::from_secs(240),
        metrics.clone(),
    );

    let changed = sweeper.sweep_once(260_000).await.expect("sweep");
    assert_eq!(changed, 1);
    assert_eq!(
        *observer.availability.lock().expect("lock"),
        vec![("temp".to_string(), false)]
    );
    assert_eq!(metrics.snapshot().entities_marked_stale, 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_sweep_runs_after_each_period() {
    let registry = Arc::new(EntityRegistry::new());
    registry
        .upsert("TEMP", "23", &entry("TEMP"), None, now_epoch_ms() - 1_000)
        .expect("upsert");
    let observer = Arc::new(RecordingObserver::default());
    let metrics = Arc::new(LinkMetrics::new());
    let cancel = CancellationToken::new();
    let task = StalenessSweeper::new(
        "victron",
        registry.clone(),
        observer.clone(),
        Duration::from_secs(300),
        Duration::ZERO,
        metrics.clone(),
    )
    .spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(registry.get("TEMP").expect("get").expect("entity").available);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!registry.get("TEMP").expect("get").expect("entity").available);
    assert_eq!(observer.availability.lock().expect("lock").len(), 1);

    cancel.cancel();
    task.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn cancelled_sweeper_exits_promptly() {
    let registry = Arc::new(EntityRegistry::new());
    let cancel = CancellationToken::new();
    let task = StalenessSweeper::new(
        "victron",
        registry,
        Arc::new(NoopObserver),
        Duration::from_secs(300),
        Duration::from_secs(240),
        Arc::new(LinkMetrics::new()),
    )
    .spawn(cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("sweeper should stop before the period elapses")
        .expect("join");
}

/// 在可用性通知中阻塞，直到测试放行；记录宿主最后看到的可用性。
#[derive(Default)]
struct GatedObserver {
    entered: Notify,
    release: Notify,
    last_seen: Mutex<Option<bool>>,
}

impl GatedObserver {
    fn record(&self, entity: &MeasurementEntity) {
        *self.last_seen.lock().expect("lock") = Some(entity.available);
    }
}

#[async_trait]
impl EntityObserver for GatedObserver {
    async fn entity_created(&self, entity: &MeasurementEntity) -> PublishOutcome {
        self.record(entity);
        PublishOutcome::Published
    }

    async fn entity_updated(&self, entity: &MeasurementEntity) -> PublishOutcome {
        self.record(entity);
        PublishOutcome::Published
    }

    async fn availability_changed(&self, entity: &MeasurementEntity) -> PublishOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        self.record(entity);
        PublishOutcome::Published
    }
}

#[tokio::test]
async fn update_during_stale_notification_is_published_after_it() {
    let registry = Arc::new(EntityRegistry::new());
    registry
        .upsert("TEMP", "23", &entry("TEMP"), None, 0)
        .expect("upsert");
    let observer = Arc::new(GatedObserver::default());
    let sweeper = StalenessSweeper::new(
        "victron",
        registry.clone(),
        observer.clone(),
        Duration::from_secs(300),
        Duration::from_secs(240),
        Arc::new(LinkMetrics::new()),
    );

    let sweep = tokio::spawn(async move { sweeper.sweep_once(300_000).await });
    observer.entered.notified().await;

    let ingest = {
        let registry = registry.clone();
        let observer = observer.clone();
        tokio::spawn(async move {
            let _updates = registry.lock_updates().await;
            let outcome = registry
                .upsert("TEMP", "24", &entry("TEMP"), None, 300_001)
                .expect("upsert");
            publish_event(observer.as_ref(), EntityEvent::Updated, outcome.entity()).await;
        })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!ingest.is_finished());

    observer.release.notify_one();
    assert_eq!(sweep.await.expect("join").expect("sweep"), 1);
    ingest.await.expect("join");

    let entity = registry.get("TEMP").expect("get").expect("entity");
    assert!(entity.available);
    assert_eq!(*observer.last_seen.lock().expect("lock"), Some(true));
}
