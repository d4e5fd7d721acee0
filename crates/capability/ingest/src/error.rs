//! 链路错误类型定义

/// 串口链路错误（均可恢复：触发固定延迟后重连）
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// 打开串口失败
    #[error("open failed: {0}")]
    Open(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 对端关闭（读到 EOF）
    #[error("connection closed")]
    Closed,
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::Open(err.to_string())
    }
}
