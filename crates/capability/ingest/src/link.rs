//! 串口链路管理
//!
//! 状态机：`Disconnected → Connecting → Connected →（故障）Disconnected`，
//! 任意状态收到取消即进入 `Stopped`。
//!
//! - 打开失败：同一故障周期只记录一次 error 日志，固定延迟后重试；成功连接后重置。
//! - 读取失败（含 EOF）：清空链路级最近值，固定延迟后重连。
//! - 每读到一行即交给 `LineHandler` 处理完，再读下一行。

use crate::error::LinkError;
use crate::frame::trim_line_ending;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vebridge_config::{Parity, SerialSettings};
use vebridge_telemetry::{LinkMetrics, new_session_id};

/// 单行最大字节数（含换行）；超长行整行丢弃并计为 malformed。
pub const MAX_LINE_BYTES: usize = 512;

/// 已打开链路的字节流。
pub type LineStream = Box<dyn AsyncRead + Send + Unpin>;

/// 串口打开器抽象（生产用 tokio-serial，测试用脚本化字节流）。
#[async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self) -> Result<LineStream, LinkError>;

    /// 用于日志的端口描述。
    fn describe(&self) -> String;
}

/// 逐行处理器。
///
/// 处理器由链路任务独占，可持有无需同步的可变状态（如限流表）。
#[async_trait]
pub trait LineHandler: Send {
    async fn handle_line(&mut self, line: &[u8]);
}

/// 链路状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

/// 对外可观察的链路状态快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    /// 最近一行（链路级最近值），传输故障时清空
    pub last_line: Option<String>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Disconnected,
            last_line: None,
        }
    }
}

/// 基于 tokio-serial 的串口打开器。
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    settings: SerialSettings,
}

impl SerialPortOpener {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.settings.byte_size {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.settings.parity {
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::None => tokio_serial::Parity::None,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.settings.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }

    fn flow_control(&self) -> tokio_serial::FlowControl {
        if self.settings.rtscts {
            tokio_serial::FlowControl::Hardware
        } else if self.settings.xonxoff {
            tokio_serial::FlowControl::Software
        } else {
            tokio_serial::FlowControl::None
        }
    }
}

#[async_trait]
impl PortOpener for SerialPortOpener {
    async fn open(&self) -> Result<LineStream, LinkError> {
        if self.settings.dsrdtr {
            warn!(
                target: "vebridge.link",
                port = %self.settings.port,
                "dsrdtr_flow_control_unsupported"
            );
        }
        let stream = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.data_bits())
            .parity(self.parity())
            .stop_bits(self.stop_bits())
            .flow_control(self.flow_control())
            .open_native_async()?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        self.settings.port.clone()
    }
}

enum ReadExit {
    Cancelled,
    Failed(LinkError),
}

enum LineRead {
    Eof,
    Line,
    /// 超长行，携带丢弃的字节数
    Oversized(usize),
}

/// 读取一行，最多 `MAX_LINE_BYTES` 字节；超长时丢弃该行剩余部分直到换行。
async fn read_line_bounded<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if read < MAX_LINE_BYTES || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Line);
    }
    let mut discarded = read;
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        AsyncBufReadExt::consume(&mut *reader, consumed);
        discarded += consumed;
        if done {
            break;
        }
    }
    Ok(LineRead::Oversized(discarded))
}

/// 串口链路管理器。
pub struct SerialLinkManager<O, H> {
    name: String,
    opener: O,
    handler: H,
    reconnect_delay: Duration,
    metrics: Arc<LinkMetrics>,
    status: watch::Sender<LinkStatus>,
    logged_error: bool,
}

impl<O, H> SerialLinkManager<O, H>
where
    O: PortOpener + 'static,
    H: LineHandler + 'static,
{
    pub fn new(
        name: impl Into<String>,
        opener: O,
        handler: H,
        reconnect_delay: Duration,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus::default());
        Self {
            name: name.into(),
            opener,
            handler,
            reconnect_delay,
            metrics,
            status,
            logged_error: false,
        }
    }

    /// 订阅链路状态。
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// 在后台任务中运行链路。
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// 运行链路直到取消。
    pub async fn run(mut self, cancel: CancellationToken) {
        let port = self.opener.describe();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.set_state(LinkState::Connecting);
            self.metrics.record_connect_attempt();

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self.opener.open() => opened,
            };

            match opened {
                Err(err) => {
                    self.metrics.record_connect_failure();
                    if !self.logged_error {
                        error!(
                            target: "vebridge.link",
                            link = %self.name,
                            port = %port,
                            error = %err,
                            "serial_connect_failed_will_retry"
                        );
                        self.metrics.record_connect_failure_logged();
                        self.logged_error = true;
                    } else {
                        debug!(
                            target: "vebridge.link",
                            link = %self.name,
                            port = %port,
                            error = %err,
                            "serial_connect_failed_suppressed"
                        );
                    }
                }
                Ok(stream) => {
                    self.logged_error = false;
                    let session_id = new_session_id();
                    info!(
                        target: "vebridge.link",
                        link = %self.name,
                        port = %port,
                        session_id = %session_id,
                        "serial_connected"
                    );
                    self.set_state(LinkState::Connected);
                    match self.read_loop(stream, &cancel).await {
                        ReadExit::Cancelled => break,
                        ReadExit::Failed(err) => {
                            self.metrics.record_read_failure();
                            error!(
                                target: "vebridge.link",
                                link = %self.name,
                                port = %port,
                                session_id = %session_id,
                                error = %err,
                                "serial_read_failed"
                            );
                        }
                    }
                }
            }

            if !self.handle_error(&cancel).await {
                break;
            }
        }
        self.set_state(LinkState::Stopped);
        info!(target: "vebridge.link", link = %self.name, "serial_link_stopped");
    }

    async fn read_loop(&mut self, stream: LineStream, cancel: &CancellationToken) -> ReadExit {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return ReadExit::Cancelled,
                read = read_line_bounded(&mut reader, &mut buf) => read,
            };
            match read {
                Ok(LineRead::Eof) => return ReadExit::Failed(LinkError::Closed),
                Ok(LineRead::Oversized(bytes)) => {
                    self.metrics.record_line_rejected();
                    warn!(
                        target: "vebridge.link",
                        link = %self.name,
                        reason = "malformed",
                        bytes = bytes,
                        limit = MAX_LINE_BYTES,
                        "line_too_long_discarded"
                    );
                }
                Ok(LineRead::Line) => {
                    self.metrics.record_line_received();
                    let line = trim_line_ending(&buf);
                    let text = String::from_utf8_lossy(line).into_owned();
                    self.status.send_modify(|status| status.last_line = Some(text));
                    self.handler.handle_line(line).await;
                }
                Err(err) => return ReadExit::Failed(LinkError::Io(err)),
            }
        }
    }

    /// 清空链路级状态并等待重连延迟；被取消时返回 false。
    async fn handle_error(&mut self, cancel: &CancellationToken) -> bool {
        self.status.send_modify(|status| {
            status.state = LinkState::Disconnected;
            status.last_line = None;
        });
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    fn set_state(&self, state: LinkState) {
        self.status.send_modify(|status| status.state = state);
    }
}
