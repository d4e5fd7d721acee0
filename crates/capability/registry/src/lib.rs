//! # 实体注册表模块
//!
//! 动态增长的测量实体存储：首次出现时创建、之后原地更新，实体永不删除。
//!
//! - [`store`]：`EntityRegistry`，由链路的摄取任务与过期扫描任务并发写入
//! - [`observer`]：宿主侧通知接口（创建 / 更新 / 可用性变化）
//! - [`sweeper`]：周期性过期扫描任务
//!
//! 两个写入方通过同一把 `RwLock` 串行化，单个实体的字段集不会出现交错的半更新。

pub mod observer;
pub mod store;
pub mod sweeper;

pub use observer::{EntityEvent, EntityObserver, NoopObserver, PublishOutcome, publish_event};
pub use store::{EntityRegistry, RegistryError, UpsertOutcome};
pub use sweeper::StalenessSweeper;
