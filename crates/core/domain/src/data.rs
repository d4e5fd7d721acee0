/// 目录中的单位规格。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSpec {
    /// 无单位。
    None,
    /// 字面单位代码（如 `mV`、`Dc`），需经翻译表转换。
    Literal(String),
    /// 间接引用：单位取自同一帧的第 N 个字段（`#N`）。
    Indirect(usize),
}

impl UnitSpec {
    /// 解析目录文件里的 `unit_of_measurement` 文本。
    ///
    /// `#` 后仅跟 ASCII 数字时为间接引用，其余非空文本按字面单位处理。
    /// 超出 `usize` 的序号记为 `usize::MAX`，解析时必然越界。
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::None;
        };
        if raw.is_empty() {
            return Self::None;
        }
        if let Some(index) = raw.strip_prefix('#')
            && !index.is_empty()
            && index.bytes().all(|b| b.is_ascii_digit())
        {
            return Self::Indirect(index.parse::<usize>().unwrap_or(usize::MAX));
        }
        Self::Literal(raw.to_string())
    }
}

/// 字段目录条目（加载后不可变）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub identifier: String,
    pub description: Option<String>,
    pub group: Option<String>,
    pub sentence_description: String,
    pub unit: UnitSpec,
}

/// 一行解码后的帧：以 TAB 分隔的字段序列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tokens: Vec<String>,
}

impl Frame {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// 字段 0：测量标识。
    pub fn identifier(&self) -> &str {
        self.token(0).unwrap_or_default()
    }

    /// 字段 1：原始值。
    pub fn value(&self) -> &str {
        self.token(1).unwrap_or_default()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// 实体所属设备信息（宿主按 sentence 描述归组）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// 测量实体：进程生命周期内只增不删。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementEntity {
    pub unique_id: String,
    pub entity_id: String,
    pub name: String,
    pub group: String,
    pub device: DeviceInfo,
    pub unit: Option<String>,
    pub value: String,
    pub last_updated_ms: i64,
    pub available: bool,
}
