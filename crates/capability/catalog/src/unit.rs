//! 单位解析：字面代码翻译与 `#N` 间接引用。

use domain::{CatalogEntry, Frame, UnitSpec};

/// 已知单位代码 → 显示文本（按大写匹配）。
const UNIT_TRANSLATIONS: &[(&str, &str)] = &[
    ("MV", "mV"),
    ("P", "%"),
    ("W", "W"),
    ("MA", "mA"),
    ("DC", "°C"),
    ("MAH", "mAh"),
    ("MIN", "minutes"),
    ("SEC", "seconds"),
    ("CKWH", "0.01 kWh"),
];

/// 间接单位解析失败。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("unit reference #{index} out of range for frame with {tokens} tokens")]
    IndexOutOfRange { index: usize, tokens: usize },
}

/// 翻译单位代码。
///
/// 大写只用于匹配翻译表；未知代码按目录或帧中的原始写法返回（`Hz` 仍为 `Hz`）。
pub fn translate_unit(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    UNIT_TRANSLATIONS
        .iter()
        .find(|(known, _)| *known == upper)
        .map(|(_, display)| (*display).to_string())
        .unwrap_or_else(|| code.to_string())
}

/// 结合当前帧解析目录条目的单位。
///
/// 间接引用要求 `1 <= N < frame.len()`，越界时返回错误（调用方丢弃本次更新）。
pub fn resolve_unit(entry: &CatalogEntry, frame: &Frame) -> Result<Option<String>, UnitError> {
    match &entry.unit {
        UnitSpec::None => Ok(None),
        UnitSpec::Literal(code) => Ok(Some(translate_unit(code))),
        UnitSpec::Indirect(index) => {
            let index = *index;
            if index < 1 || index >= frame.len() {
                return Err(UnitError::IndexOutOfRange {
                    index,
                    tokens: frame.len(),
                });
            }
            Ok(frame.token(index).map(translate_unit))
        }
    }
}
