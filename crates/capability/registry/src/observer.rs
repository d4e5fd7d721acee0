//! 宿主通知接口。

use async_trait::async_trait;
use domain::MeasurementEntity;
use tracing::debug;

/// 通知结果：宿主尚未挂载实体时返回 `NotAttached`，不视为错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    NotAttached,
}

/// 实体事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    Created,
    Updated,
    AvailabilityChanged,
}

impl EntityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::AvailabilityChanged => "availability_changed",
        }
    }
}

/// 宿主侧实体观察者。
#[async_trait]
pub trait EntityObserver: Send + Sync {
    async fn entity_created(&self, entity: &MeasurementEntity) -> PublishOutcome;

    async fn entity_updated(&self, entity: &MeasurementEntity) -> PublishOutcome;

    async fn availability_changed(&self, entity: &MeasurementEntity) -> PublishOutcome;
}

/// 空观察者（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopObserver;

#[async_trait]
impl EntityObserver for NoopObserver {
    async fn entity_created(&self, _entity: &MeasurementEntity) -> PublishOutcome {
        PublishOutcome::Published
    }

    async fn entity_updated(&self, _entity: &MeasurementEntity) -> PublishOutcome {
        PublishOutcome::Published
    }

    async fn availability_changed(&self, _entity: &MeasurementEntity) -> PublishOutcome {
        PublishOutcome::Published
    }
}

/// 发送一次通知（即发即弃）。
pub async fn publish_event(
    observer: &dyn EntityObserver,
    event: EntityEvent,
    entity: &MeasurementEntity,
) -> PublishOutcome {
    let outcome = match event {
        EntityEvent::Created => observer.entity_created(entity).await,
        EntityEvent::Updated => observer.entity_updated(entity).await,
        EntityEvent::AvailabilityChanged => observer.availability_changed(entity).await,
    };
    if outcome == PublishOutcome::NotAttached {
        debug!(
            target: "vebridge.registry",
            unique_id = %entity.unique_id,
            event = event.as_str(),
            "entity_publish_not_attached"
        );
    }
    outcome
}
