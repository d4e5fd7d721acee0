//! 串口遥测桥接进程：按配置启动各条链路，Ctrl-C 后统一停止。

mod links;
mod observer;

use observer::LoggingObserver;
use std::sync::Arc;
use tracing::info;
use vebridge_config::AppConfig;
use vebridge_telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let observer = Arc::new(LoggingObserver);
    let handles = links::start_links(&config, observer).await;
    info!(
        target: "vebridge.app",
        configured = config.links.len(),
        started = handles.len(),
        "vebridge_started"
    );

    tokio::signal::ctrl_c().await?;
    info!(target: "vebridge.app", "shutdown_requested");

    links::stop_links(handles).await;
    info!(target: "vebridge.app", "vebridge_stopped");
    Ok(())
}
