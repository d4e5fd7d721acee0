use async_trait::async_trait;
use domain::MeasurementEntity;
use tracing::info;
use vebridge_registry::{EntityObserver, PublishOutcome};

/// 将实体事件输出到日志的观察者。
#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl EntityObserver for LoggingObserver {
    async fn entity_created(&self, entity: &MeasurementEntity) -> PublishOutcome {
        info!(
            target: "vebridge.registry",
            entity_id = %entity.entity_id,
            name = %entity.name,
            group = %entity.group,
            device = %entity.device.name,
            unit = ?entity.unit,
            value = %entity.value,
            "entity_published"
        );
        PublishOutcome::Published
    }

    async fn entity_updated(&self, entity: &MeasurementEntity) -> PublishOutcome {
        info!(
            target: "vebridge.registry",
            entity_id = %entity.entity_id,
            unit = ?entity.unit,
            value = %entity.value,
            available = entity.available,
            "entity_state_changed"
        );
        PublishOutcome::Published
    }

    async fn availability_changed(&self, entity: &MeasurementEntity) -> PublishOutcome {
        info!(
            target: "vebridge.registry",
            entity_id = %entity.entity_id,
            available = entity.available,
            "entity_availability_changed"
        );
        PublishOutcome::Published
    }
}
