//! 链路运行配置加载。
//!
//! 默认从环境变量构造单条链路；设置 `VEBRIDGE_LINKS_FILE` 时改为从 JSON 文件读取多条链路，
//! 每条链路是完全独立的实例（独立目录、注册表、限流状态）。

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("duplicate link name: {0}")]
    DuplicateName(String),
    #[error("links file error: {0}")]
    LinksFile(String),
}

/// 校验位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Some(Self::None),
            "even" | "e" => Some(Self::Even),
            "odd" | "o" => Some(Self::Odd),
            _ => None,
        }
    }
}

/// 限流键的派生方式。
///
/// - `LinePrefix`（默认）：取原始行的前 6 个字符，与解析出的标识无关。
/// - `Identifier`：取帧的第一个字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleKeyMode {
    #[default]
    LinePrefix,
    Identifier,
}

impl ThrottleKeyMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line_prefix" | "prefix" => Some(Self::LinePrefix),
            "identifier" | "id" => Some(Self::Identifier),
            _ => None,
        }
    }
}

/// 串口参数（对核心而言是不透明的连接参数）。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub xonxoff: bool,
    pub rtscts: bool,
    pub dsrdtr: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            byte_size: 8,
            parity: Parity::None,
            stop_bits: 1,
            xonxoff: false,
            rtscts: false,
            dsrdtr: false,
        }
    }
}

/// 单条链路配置。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    #[serde(flatten)]
    pub serial: SerialSettings,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_throttle_seconds")]
    pub throttle_seconds: u64,
    #[serde(default)]
    pub throttle_key: ThrottleKeyMode,
    #[serde(default = "default_reconnect_seconds")]
    pub reconnect_seconds: u64,
    #[serde(default = "default_sweep_seconds")]
    pub sweep_seconds: u64,
    #[serde(default = "default_stale_seconds")]
    pub stale_seconds: u64,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("Victronusb.json")
}

fn default_throttle_seconds() -> u64 {
    5
}

fn default_reconnect_seconds() -> u64 {
    5
}

fn default_sweep_seconds() -> u64 {
    300
}

fn default_stale_seconds() -> u64 {
    240
}

impl LinkConfig {
    /// 使用默认串口参数与时间常量构造链路配置。
    pub fn new(name: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial: SerialSettings {
                port: port.into(),
                ..SerialSettings::default()
            },
            catalog_path: default_catalog_path(),
            throttle_seconds: default_throttle_seconds(),
            throttle_key: ThrottleKeyMode::default(),
            reconnect_seconds: default_reconnect_seconds(),
            sweep_seconds: default_sweep_seconds(),
            stale_seconds: default_stale_seconds(),
        }
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(self.throttle_seconds)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_seconds)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_seconds)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_seconds)
    }

    /// 校验链路参数。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("name", &self.name));
        }
        if self.serial.port.trim().is_empty() {
            return Err(invalid("serial_port", &self.serial.port));
        }
        if self.serial.baud_rate == 0 {
            return Err(invalid("baud_rate", "0"));
        }
        if !(5..=8).contains(&self.serial.byte_size) {
            return Err(invalid("byte_size", &self.serial.byte_size.to_string()));
        }
        if ![1, 2].contains(&self.serial.stop_bits) {
            return Err(invalid("stop_bits", &self.serial.stop_bits.to_string()));
        }
        if self.serial.xonxoff && self.serial.rtscts {
            return Err(invalid("flow_control", "xonxoff+rtscts"));
        }
        for (key, value) in [
            ("throttle_seconds", self.throttle_seconds),
            ("reconnect_seconds", self.reconnect_seconds),
            ("sweep_seconds", self.sweep_seconds),
            ("stale_seconds", self.stale_seconds),
        ] {
            if value == 0 {
                return Err(invalid(key, "0"));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid(key.to_string(), value.to_string())
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub links: Vec<LinkConfig>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let links = match read_optional("VEBRIDGE_LINKS_FILE") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|err| ConfigError::LinksFile(format!("{}: {}", path, err)))?;
                parse_links_json(&text)?
            }
            None => vec![link_from_env()?],
        };
        Self::from_links(links)
    }

    /// 校验并组装多条链路。
    pub fn from_links(links: Vec<LinkConfig>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for link in &links {
            link.validate()?;
            if !names.insert(link.name.clone()) {
                return Err(ConfigError::DuplicateName(link.name.clone()));
            }
        }
        Ok(Self { links })
    }
}

/// 解析链路配置文件（JSON 数组）。
pub fn parse_links_json(text: &str) -> Result<Vec<LinkConfig>, ConfigError> {
    serde_json::from_str::<Vec<LinkConfig>>(text)
        .map_err(|err| ConfigError::LinksFile(err.to_string()))
}

fn link_from_env() -> Result<LinkConfig, ConfigError> {
    let name = env::var("VEBRIDGE_NAME").unwrap_or_else(|_| "victron".to_string());
    let port = env::var("VEBRIDGE_SERIAL_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let baud_rate = read_u32_with_default("VEBRIDGE_BAUDRATE", 19200)?;
    let byte_size = read_u8_with_default("VEBRIDGE_BYTESIZE", 8)?;
    let stop_bits = read_u8_with_default("VEBRIDGE_STOPBITS", 1)?;
    let parity = match env::var("VEBRIDGE_PARITY") {
        Ok(value) => Parity::parse(&value).ok_or_else(|| invalid("VEBRIDGE_PARITY", &value))?,
        Err(_) => Parity::None,
    };
    let throttle_key = match env::var("VEBRIDGE_THROTTLE_KEY") {
        Ok(value) => ThrottleKeyMode::parse(&value)
            .ok_or_else(|| invalid("VEBRIDGE_THROTTLE_KEY", &value))?,
        Err(_) => ThrottleKeyMode::default(),
    };
    let catalog_path = read_optional("VEBRIDGE_CATALOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(default_catalog_path);

    Ok(LinkConfig {
        name,
        serial: SerialSettings {
            port,
            baud_rate,
            byte_size,
            parity,
            stop_bits,
            xonxoff: read_bool_with_default("VEBRIDGE_XONXOFF", false),
            rtscts: read_bool_with_default("VEBRIDGE_RTSCTS", false),
            dsrdtr: read_bool_with_default("VEBRIDGE_DSRDTR", false),
        },
        catalog_path,
        throttle_seconds: read_u64_with_default("VEBRIDGE_THROTTLE_SECONDS", 5)?,
        throttle_key,
        reconnect_seconds: read_u64_with_default("VEBRIDGE_RECONNECT_SECONDS", 5)?,
        sweep_seconds: read_u64_with_default("VEBRIDGE_SWEEP_SECONDS", 300)?,
        stale_seconds: read_u64_with_default("VEBRIDGE_STALE_SECONDS", 240)?,
    })
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
