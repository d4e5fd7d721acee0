//! # 数据接入能力模块
//!
//! 负责串口链路生命周期与逐行帧解析：
//! - **frame**：将一行解码文本解析为 `Frame`，或给出拒绝原因
//! - **link**：打开串口、按行读取、故障后固定延迟重连、取消即停止
//!
//! ```text
//! PortOpener (tokio-serial / 测试脚本)
//!       │ 字节流
//!       ▼
//! SerialLinkManager ──每行──▶ LineHandler (pipeline)
//! ```

mod error;
mod frame;
mod link;

pub use error::LinkError;
pub use frame::{FrameRejection, parse_line, trim_line_ending};
pub use link::{
    LineHandler, LineStream, LinkState, LinkStatus, MAX_LINE_BYTES, PortOpener,
    SerialLinkManager, SerialPortOpener,
};
