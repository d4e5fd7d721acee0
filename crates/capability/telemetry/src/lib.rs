//! 追踪初始化与链路指标。

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 链路指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkMetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connect_failures_logged: u64,
    pub read_failures: u64,
    pub lines_received: u64,
    pub lines_rejected: u64,
    pub lines_throttled: u64,
    pub unknown_identifiers: u64,
    pub units_unresolved: u64,
    pub entities_created: u64,
    pub entities_updated: u64,
    pub entities_marked_stale: u64,
}

/// 单条链路的指标（每条链路一个实例，不做进程级共享）。
#[derive(Debug, Default)]
pub struct LinkMetrics {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    connect_failures_logged: AtomicU64,
    read_failures: AtomicU64,
    lines_received: AtomicU64,
    lines_rejected: AtomicU64,
    lines_throttled: AtomicU64,
    unknown_identifiers: AtomicU64,
    units_unresolved: AtomicU64,
    entities_created: AtomicU64,
    entities_updated: AtomicU64,
    entities_marked_stale: AtomicU64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            connect_failures_logged: self.connect_failures_logged.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            lines_throttled: self.lines_throttled.load(Ordering::Relaxed),
            unknown_identifiers: self.unknown_identifiers.load(Ordering::Relaxed),
            units_unresolved: self.units_unresolved.load(Ordering::Relaxed),
            entities_created: self.entities_created.load(Ordering::Relaxed),
            entities_updated: self.entities_updated.load(Ordering::Relaxed),
            entities_marked_stale: self.entities_marked_stale.load(Ordering::Relaxed),
        }
    }

    /// 记录串口打开尝试次数。
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录串口打开失败次数。
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录实际输出的连接失败日志次数（同一故障周期只输出一次）。
    pub fn record_connect_failure_logged(&self) {
        self.connect_failures_logged.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录读取失败次数。
    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录接收行数。
    pub fn record_line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录被解析拒绝的行数。
    pub fn record_line_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录限流丢弃次数。
    pub fn record_line_throttled(&self) {
        self.lines_throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录未知标识丢弃次数。
    pub fn record_unknown_identifier(&self) {
        self.unknown_identifiers.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录间接单位越界丢弃次数。
    pub fn record_unit_unresolved(&self) {
        self.units_unresolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_created(&self) {
        self.entities_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_updated(&self) {
        self.entities_updated.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录扫描标记为不可用的实体数。
    pub fn record_entities_marked_stale(&self, count: u64) {
        self.entities_marked_stale.fetch_add(count, Ordering::Relaxed);
    }
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成一次串口连接的 session_id。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
