//! 行帧解析
//!
//! 线上格式：`<identifier><TAB><value>`，以换行结尾。本层只做结构校验，不做校验和。

use domain::Frame;
use std::fmt;

/// 一行被拒绝的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRejection {
    /// 空行或仅含空白
    Empty,
    /// 字段数不是 2
    Malformed { tokens: usize },
    /// 不是合法 UTF-8
    DecodeError(String),
}

impl FrameRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Malformed { .. } => "malformed",
            Self::DecodeError(_) => "decode_error",
        }
    }
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::Malformed { tokens } => write!(f, "malformed line: {} tokens", tokens),
            Self::DecodeError(err) => write!(f, "decode error: {}", err),
        }
    }
}

/// 去掉行尾的 `\r` / `\n`，保留 TAB 等其他空白。
pub fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &raw[..end]
}

/// 解析一行原始字节。
pub fn parse_line(raw: &[u8]) -> Result<Frame, FrameRejection> {
    let raw = trim_line_ending(raw);
    let text =
        std::str::from_utf8(raw).map_err(|err| FrameRejection::DecodeError(err.to_string()))?;
    if text.trim().is_empty() {
        return Err(FrameRejection::Empty);
    }
    let tokens = text.split('\t').map(str::to_string).collect::<Vec<_>>();
    if tokens.len() != 2 {
        return Err(FrameRejection::Malformed {
            tokens: tokens.len(),
        });
    }
    Ok(Frame::new(tokens))
}
