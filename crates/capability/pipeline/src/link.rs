//! 单链路装配：摄取任务 + 过期扫描任务，共用一个取消令牌。

use crate::throttle::ThrottleGate;
use crate::{LinePipeline, LinkContext};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vebridge_catalog::FieldCatalog;
use vebridge_config::LinkConfig;
use vebridge_ingest::{LinkStatus, PortOpener, SerialLinkManager};
use vebridge_registry::{EntityObserver, EntityRegistry, StalenessSweeper};
use vebridge_telemetry::LinkMetrics;

/// 运行中的链路句柄。
pub struct LinkHandle {
    name: String,
    status: watch::Receiver<LinkStatus>,
    metrics: Arc<LinkMetrics>,
    registry: Arc<EntityRegistry>,
    cancel: CancellationToken,
    ingest_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl LinkHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 订阅链路状态（含链路级最近一行）。
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn metrics(&self) -> Arc<LinkMetrics> {
        self.metrics.clone()
    }

    pub fn registry(&self) -> Arc<EntityRegistry> {
        self.registry.clone()
    }

    /// 同时停止摄取与扫描任务，并等待两者退出。
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.ingest_task.await {
            warn!(target: "vebridge.app", link = %self.name, error = %err, "ingest_task_join_failed");
        }
        if let Err(err) = self.sweeper_task.await {
            warn!(target: "vebridge.app", link = %self.name, error = %err, "sweeper_task_join_failed");
        }
        info!(target: "vebridge.app", link = %self.name, "link_stopped");
    }
}

/// 按链路配置启动摄取与过期扫描。
pub fn spawn_link<O>(
    config: &LinkConfig,
    catalog: Arc<FieldCatalog>,
    observer: Arc<dyn EntityObserver>,
    opener: O,
) -> LinkHandle
where
    O: PortOpener + 'static,
{
    let registry = Arc::new(EntityRegistry::new());
    let metrics = Arc::new(LinkMetrics::new());
    let context = LinkContext {
        name: config.name.clone(),
        catalog,
        registry: registry.clone(),
        metrics: metrics.clone(),
    };
    let pipeline = LinePipeline::new(
        context,
        observer.clone(),
        ThrottleGate::new(config.throttle_interval()),
        config.throttle_key,
    );

    let cancel = CancellationToken::new();
    let manager = SerialLinkManager::new(
        config.name.clone(),
        opener,
        pipeline,
        config.reconnect_delay(),
        metrics.clone(),
    );
    let status = manager.status();
    let ingest_task = manager.spawn(cancel.clone());

    let sweeper_task = StalenessSweeper::new(
        config.name.clone(),
        registry.clone(),
        observer,
        config.sweep_period(),
        config.stale_timeout(),
        metrics.clone(),
    )
    .spawn(cancel.clone());

    info!(
        target: "vebridge.app",
        link = %config.name,
        port = %config.serial.port,
        throttle_seconds = config.throttle_seconds,
        "link_started"
    );

    LinkHandle {
        name: config.name.clone(),
        status,
        metrics,
        registry,
        cancel,
        ingest_task,
        sweeper_task,
    }
}
