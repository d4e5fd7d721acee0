//! # 数据流水线模块
//!
//! 将单条链路的各组件串起来：
//!
//! ```text
//! 原始行 → 帧解析 → 限流 → 目录查询 → 单位解析 → 注册表 upsert → 观察者通知
//! ```
//!
//! 任一环节拒绝只影响当前行，链路继续读取下一行。

mod link;
mod throttle;

pub use link::{LinkHandle, spawn_link};
pub use throttle::{THROTTLE_PREFIX_CHARS, ThrottleGate, throttle_key};

use async_trait::async_trait;
use domain::{Frame, MeasurementEntity, now_epoch_ms};
use std::sync::Arc;
use tracing::{debug, warn};
use vebridge_catalog::{FieldCatalog, resolve_unit};
use vebridge_config::ThrottleKeyMode;
use vebridge_ingest::{FrameRejection, LineHandler, parse_line, trim_line_ending};
use vebridge_registry::{
    EntityEvent, EntityObserver, EntityRegistry, UpsertOutcome, publish_event,
};
use vebridge_telemetry::LinkMetrics;

/// 单行处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Rejected(FrameRejection),
    Throttled,
    UnknownIdentifier,
    UnitUnresolved,
    RegistryUnavailable,
    Created(MeasurementEntity),
    Updated(MeasurementEntity),
}

/// 链路上下文：目录、注册表与指标。
///
/// 每条链路独立持有，不做进程级共享。
#[derive(Clone)]
pub struct LinkContext {
    pub name: String,
    pub catalog: Arc<FieldCatalog>,
    pub registry: Arc<EntityRegistry>,
    pub metrics: Arc<LinkMetrics>,
}

/// 逐行流水线（由链路任务独占，持有限流状态）。
pub struct LinePipeline {
    context: LinkContext,
    observer: Arc<dyn EntityObserver>,
    throttle: ThrottleGate,
    key_mode: ThrottleKeyMode,
}

impl LinePipeline {
    pub fn new(
        context: LinkContext,
        observer: Arc<dyn EntityObserver>,
        throttle: ThrottleGate,
        key_mode: ThrottleKeyMode,
    ) -> Self {
        Self {
            context,
            observer,
            throttle,
            key_mode,
        }
    }

    pub fn context(&self) -> &LinkContext {
        &self.context
    }

    /// 以指定时间处理一行原始字节。
    pub async fn process_line_at(&mut self, raw: &[u8], now_ms: i64) -> LineOutcome {
        let frame = match parse_line(raw) {
            Ok(frame) => frame,
            Err(rejection) => {
                self.context.metrics.record_line_rejected();
                match &rejection {
                    FrameRejection::Empty => debug!(
                        target: "vebridge.pipeline",
                        link = %self.context.name,
                        "line_rejected_empty"
                    ),
                    _ => warn!(
                        target: "vebridge.pipeline",
                        link = %self.context.name,
                        reason = rejection.reason(),
                        detail = %rejection,
                        line = %String::from_utf8_lossy(trim_line_ending(raw)),
                        "line_rejected"
                    ),
                }
                return LineOutcome::Rejected(rejection);
            }
        };
        let raw_line = String::from_utf8_lossy(trim_line_ending(raw)).into_owned();
        self.process_frame_at(&raw_line, frame, now_ms).await
    }

    /// 处理已解析的帧；`raw_line` 用于派生限流 key。
    pub async fn process_frame_at(
        &mut self,
        raw_line: &str,
        frame: Frame,
        now_ms: i64,
    ) -> LineOutcome {
        let link = self.context.name.as_str();
        let identifier = frame.identifier();

        let key = throttle_key(self.key_mode, raw_line, &frame);
        if !self.throttle.admit(&key, now_ms) {
            self.context.metrics.record_line_throttled();
            debug!(
                target: "vebridge.pipeline",
                link = %link,
                identifier = %identifier,
                throttle_key = %key,
                "line_throttled"
            );
            return LineOutcome::Throttled;
        }

        let Some(entry) = self.context.catalog.lookup(identifier) else {
            self.context.metrics.record_unknown_identifier();
            debug!(
                target: "vebridge.pipeline",
                link = %link,
                identifier = %identifier,
                "identifier_unknown"
            );
            return LineOutcome::UnknownIdentifier;
        };

        let unit = match resolve_unit(entry, &frame) {
            Ok(unit) => unit,
            Err(err) => {
                self.context.metrics.record_unit_unresolved();
                warn!(
                    target: "vebridge.pipeline",
                    link = %link,
                    identifier = %identifier,
                    error = %err,
                    "unit_unresolved_update_skipped"
                );
                return LineOutcome::UnitUnresolved;
            }
        };

        // 修改与通知期间持有写入串行锁，过期扫描的通知不会晚于本次更新到达宿主
        let registry = self.context.registry.clone();
        let _updates = registry.lock_updates().await;
        let upserted = registry.upsert(identifier, frame.value(), entry, unit, now_ms);
        let outcome = match upserted {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    target: "vebridge.pipeline",
                    link = %link,
                    identifier = %identifier,
                    error = %err,
                    "registry_upsert_failed"
                );
                return LineOutcome::RegistryUnavailable;
            }
        };

        match outcome {
            UpsertOutcome::Created(entity) => {
                self.context.metrics.record_entity_created();
                debug!(
                    target: "vebridge.pipeline",
                    link = %link,
                    unique_id = %entity.unique_id,
                    value = %entity.value,
                    unit = ?entity.unit,
                    "entity_created"
                );
                publish_event(self.observer.as_ref(), EntityEvent::Created, &entity).await;
                LineOutcome::Created(entity)
            }
            UpsertOutcome::Updated(entity) => {
                self.context.metrics.record_entity_updated();
                debug!(
                    target: "vebridge.pipeline",
                    link = %link,
                    unique_id = %entity.unique_id,
                    value = %entity.value,
                    available = entity.available,
                    "entity_updated"
                );
                publish_event(self.observer.as_ref(), EntityEvent::Updated, &entity).await;
                LineOutcome::Updated(entity)
            }
        }
    }
}

#[async_trait]
impl LineHandler for LinePipeline {
    async fn handle_line(&mut self, line: &[u8]) {
        self.process_line_at(line, now_epoch_ms()).await;
    }
}
