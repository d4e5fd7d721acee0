//! 实体注册表实现。

use domain::{
    CatalogEntry, DEFAULT_GROUP, DeviceInfo, MeasurementEntity, entity_unique_id,
    value_is_available,
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// 注册表错误。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry lock poisoned")]
    LockPoisoned,
}

/// upsert 结果（携带写入后的实体快照）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(MeasurementEntity),
    Updated(MeasurementEntity),
}

impl UpsertOutcome {
    pub fn entity(&self) -> &MeasurementEntity {
        match self {
            Self::Created(entity) | Self::Updated(entity) => entity,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// 测量实体注册表。
///
/// 摄取任务与过期扫描任务在"修改 + 通知宿主"期间都持有 `updates` 锁，
/// 宿主收到的事件顺序与注册表内的修改顺序一致。
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, MeasurementEntity>>,
    updates: tokio::sync::Mutex<()>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取写入串行锁；持有期间完成修改并发出对应通知。
    pub async fn lock_updates(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.updates.lock().await
    }

    /// 创建或更新实体。
    ///
    /// 已存在时原地刷新值、时间戳、可用性，并采用调用方本次解析出的单位。
    pub fn upsert(
        &self,
        identifier: &str,
        raw_value: &str,
        entry: &CatalogEntry,
        unit: Option<String>,
        now_ms: i64,
    ) -> Result<UpsertOutcome, RegistryError> {
        let unique_id = entity_unique_id(identifier);
        let available = value_is_available(raw_value);
        let mut entities = self
            .entities
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;

        if let Some(entity) = entities.get_mut(&unique_id) {
            entity.value = raw_value.to_string();
            entity.last_updated_ms = now_ms;
            entity.available = available;
            entity.unit = unit;
            return Ok(UpsertOutcome::Updated(entity.clone()));
        }

        let group = entry
            .group
            .clone()
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());
        let entity = MeasurementEntity {
            entity_id: format!("sensor.{}", unique_id),
            unique_id: unique_id.clone(),
            name: entry
                .description
                .clone()
                .unwrap_or_else(|| identifier.to_string()),
            device: DeviceInfo {
                name: entry.sentence_description.clone(),
                manufacturer: group.clone(),
                model: identifier.to_string(),
            },
            group,
            unit,
            value: raw_value.to_string(),
            last_updated_ms: now_ms,
            available,
        };
        entities.insert(unique_id, entity.clone());
        Ok(UpsertOutcome::Created(entity))
    }

    /// 将超过 `timeout` 未更新的实体标记为不可用，不修改值。
    ///
    /// 返回本次由可用变为不可用的实体。
    pub fn sweep_stale(
        &self,
        now_ms: i64,
        timeout: Duration,
    ) -> Result<Vec<MeasurementEntity>, RegistryError> {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let mut entities = self
            .entities
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        let mut changed = Vec::new();
        for entity in entities.values_mut() {
            if now_ms.saturating_sub(entity.last_updated_ms) >= timeout_ms && entity.available {
                entity.available = false;
                changed.push(entity.clone());
            }
        }
        Ok(changed)
    }

    /// 按目录标识查询（内部按派生 key 索引）。
    pub fn get(&self, identifier: &str) -> Result<Option<MeasurementEntity>, RegistryError> {
        let entities = self
            .entities
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(entities.get(&entity_unique_id(identifier)).cloned())
    }

    /// 全部实体，按 unique_id 排序。
    pub fn list(&self) -> Result<Vec<MeasurementEntity>, RegistryError> {
        let entities = self
            .entities
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        let mut items = entities.values().cloned().collect::<Vec<_>>();
        items.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(items)
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        let entities = self
            .entities
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(entities.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}
