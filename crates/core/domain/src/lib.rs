pub mod data;

pub use data::{CatalogEntry, DeviceInfo, Frame, MeasurementEntity, UnitSpec};

/// 目录未提供分组时使用的默认分组。
pub const DEFAULT_GROUP: &str = "Other";

/// 由目录标识派生实体 unique_id：小写，空白替换为下划线。
pub fn entity_unique_id(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// 值为空即视为不可用。
pub fn value_is_available(value: &str) -> bool {
    !value.is_empty()
}

/// 获取当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
