//! 按 key 的最小间隔限流。

use domain::Frame;
use std::collections::HashMap;
use std::time::Duration;
use vebridge_config::ThrottleKeyMode;

/// 行前缀模式下参与限流 key 的字符数。
pub const THROTTLE_PREFIX_CHARS: usize = 6;

/// 限流闸门。
///
/// 首次出现的 key 直接放行；之后距上次放行不足 `min_interval` 的一律丢弃。
/// 被丢弃的行不刷新时间戳。
#[derive(Debug)]
pub struct ThrottleGate {
    min_interval_ms: i64,
    last_admitted: HashMap<String, i64>,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_ms: i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX),
            last_admitted: HashMap::new(),
        }
    }

    pub fn admit(&mut self, key: &str, now_ms: i64) -> bool {
        if let Some(last) = self.last_admitted.get(key)
            && now_ms.saturating_sub(*last) < self.min_interval_ms
        {
            return false;
        }
        self.last_admitted.insert(key.to_string(), now_ms);
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_admitted.len()
    }
}

/// 派生限流 key。
pub fn throttle_key(mode: ThrottleKeyMode, raw_line: &str, frame: &Frame) -> String {
    match mode {
        ThrottleKeyMode::LinePrefix => raw_line.chars().take(THROTTLE_PREFIX_CHARS).collect(),
        ThrottleKeyMode::Identifier => frame.identifier().to_string(),
    }
}
