//! 链路装配
//!
//! 每条链路独立加载目录；目录加载失败只跳过该链路，不影响其他链路。

use std::sync::Arc;
use tracing::{error, info};
use vebridge_catalog::FieldCatalog;
use vebridge_config::AppConfig;
use vebridge_ingest::SerialPortOpener;
use vebridge_pipeline::{LinkHandle, spawn_link};
use vebridge_registry::EntityObserver;

/// 启动全部已配置链路，返回成功启动的句柄。
pub async fn start_links(
    config: &AppConfig,
    observer: Arc<dyn EntityObserver>,
) -> Vec<LinkHandle> {
    let mut handles = Vec::with_capacity(config.links.len());
    for link in &config.links {
        let catalog = match FieldCatalog::load(&link.catalog_path).await {
            Ok(catalog) => catalog,
            Err(err) => {
                error!(
                    target: "vebridge.app",
                    link = %link.name,
                    catalog_path = %link.catalog_path.display(),
                    error = %err,
                    "catalog_load_failed_link_skipped"
                );
                continue;
            }
        };
        info!(
            target: "vebridge.app",
            link = %link.name,
            catalog_path = %link.catalog_path.display(),
            fields = catalog.len(),
            "catalog_loaded"
        );
        let opener = SerialPortOpener::new(link.serial.clone());
        handles.push(spawn_link(link, Arc::new(catalog), observer.clone(), opener));
    }
    handles
}

/// 停止全部链路并输出最终指标。
pub async fn stop_links(handles: Vec<LinkHandle>) {
    for handle in handles {
        let name = handle.name().to_string();
        let metrics = handle.metrics();
        let entities = handle.registry().len().ok();
        handle.stop().await;
        let snapshot = metrics.snapshot();
        info!(
            target: "vebridge.app",
            link = %name,
            entities = ?entities,
            lines_received = snapshot.lines_received,
            lines_rejected = snapshot.lines_rejected,
            lines_throttled = snapshot.lines_throttled,
            unknown_identifiers = snapshot.unknown_identifiers,
            connect_failures = snapshot.connect_failures,
            read_failures = snapshot.read_failures,
            "link_final_metrics"
        );
    }
}
