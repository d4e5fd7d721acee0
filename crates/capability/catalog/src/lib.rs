//! 字段目录：测量标识 → 描述、分组、单位规格。
//!
//! 目录在启动时加载一次，之后只读共享，无需同步。

mod unit;

pub use unit::{UnitError, resolve_unit, translate_unit};

use domain::{CatalogEntry, UnitSpec};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// 目录加载错误。
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog read failed ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 目录文件中的一个 sentence 分组。
#[derive(Debug, Clone, Deserialize)]
pub struct SentenceGroup {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub sentence_description: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// 目录文件中的单个字段定义。
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefinition {
    pub unique_id: String,
    #[serde(default)]
    pub full_description: Option<String>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
}

/// 只读字段目录。
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl FieldCatalog {
    /// 将分组列表展平为按标识索引的目录。
    ///
    /// 重复标识后者覆盖前者。
    pub fn from_groups(groups: Vec<SentenceGroup>) -> Self {
        let mut entries = HashMap::new();
        for sentence in groups {
            for field in sentence.fields {
                let entry = CatalogEntry {
                    identifier: field.unique_id.clone(),
                    description: field.full_description.filter(|desc| !desc.is_empty()),
                    group: sentence.group.clone().filter(|group| !group.is_empty()),
                    sentence_description: sentence.sentence_description.clone(),
                    unit: UnitSpec::parse(field.unit_of_measurement.as_deref()),
                };
                if let Some(previous) = entries.insert(field.unique_id, entry) {
                    debug!(
                        target: "vebridge.catalog",
                        identifier = %previous.identifier,
                        "catalog_duplicate_identifier_overwritten"
                    );
                }
            }
        }
        Self { entries }
    }

    /// 从 JSON 文本构造目录。
    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let groups: Vec<SentenceGroup> = serde_json::from_str(text)?;
        Ok(Self::from_groups(groups))
    }

    /// 从目录文件加载。
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json_str(&text)
    }

    pub fn lookup(&self, identifier: &str) -> Option<&CatalogEntry> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 所有已知标识（无序）。
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
