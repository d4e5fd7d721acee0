//! 周期性过期扫描
//!
//! 每个周期先等待再扫描，链路停止（取消）时立即退出。

use crate::observer::{EntityEvent, EntityObserver, publish_event};
use crate::store::{EntityRegistry, RegistryError};
use domain::now_epoch_ms;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vebridge_telemetry::LinkMetrics;

/// 过期扫描任务。
pub struct StalenessSweeper {
    link: String,
    registry: Arc<EntityRegistry>,
    observer: Arc<dyn EntityObserver>,
    period: Duration,
    timeout: Duration,
    metrics: Arc<LinkMetrics>,
}

impl StalenessSweeper {
    pub fn new(
        link: impl Into<String>,
        registry: Arc<EntityRegistry>,
        observer: Arc<dyn EntityObserver>,
        period: Duration,
        timeout: Duration,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        Self {
            link: link.into(),
            registry,
            observer,
            period,
            timeout,
            metrics,
        }
    }

    /// 执行一次扫描，返回被标记为不可用的实体数。
    ///
    /// 扫描与通知在写入串行锁内完成，期间摄取任务的 upsert 需等待。
    pub async fn sweep_once(&self, now_ms: i64) -> Result<usize, RegistryError> {
        let _updates = self.registry.lock_updates().await;
        let changed = self.registry.sweep_stale(now_ms, self.timeout)?;
        for entity in &changed {
            info!(
                target: "vebridge.registry",
                link = %self.link,
                unique_id = %entity.unique_id,
                last_updated_ms = entity.last_updated_ms,
                "entity_marked_stale"
            );
            publish_event(self.observer.as_ref(), EntityEvent::AvailabilityChanged, entity).await;
        }
        self.metrics
            .record_entities_marked_stale(changed.len() as u64);
        Ok(changed.len())
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
            debug!(target: "vebridge.registry", link = %self.link, "staleness_sweep_running");
            if let Err(err) = self.sweep_once(now_epoch_ms()).await {
                warn!(
                    target: "vebridge.registry",
                    link = %self.link,
                    error = %err,
                    "staleness_sweep_failed"
                );
            }
        }
        debug!(target: "vebridge.registry", link = %self.link, "staleness_sweeper_stopped");
    }
}
