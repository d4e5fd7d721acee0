use async_trait::async_trait;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vebridge_ingest::{
    LineHandler, LineStream, LinkError, LinkState, MAX_LINE_BYTES, PortOpener,
    SerialLinkManager,
};
use vebridge_telemetry::LinkMetrics;

const DELAY: Duration = Duration::from_secs(5);

/// 永不返回数据的流（模拟保持连接的空闲串口）。
struct IdleStream;

impl AsyncRead for IdleStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

/// 按脚本依次返回打开结果；脚本耗尽后返回空闲流。
struct ScriptedOpener {
    script: Mutex<VecDeque<Result<Vec<u8>, String>>>,
}

impl ScriptedOpener {
    fn new(script: Vec<Result<Vec<u8>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl PortOpener for ScriptedOpener {
    async fn open(&self) -> Result<LineStream, LinkError> {
        let next = self.script.lock().expect("script").pop_front();
        match next {
            Some(Ok(bytes)) => Ok(Box::new(std::io::Cursor::new(bytes))),
            Some(Err(message)) => Err(LinkError::Open(message)),
            None => Ok(Box::new(IdleStream)),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// 始终失败的打开器。
struct FailingOpener;

#[async_trait]
impl PortOpener for FailingOpener {
    async fn open(&self) -> Result<LineStream, LinkError> {
        Err(LinkError::Open("no such device".to_string()))
    }

    fn describe(&self) -> String {
        "/dev/missing".to_string()
    }
}

struct ChannelHandler {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl LineHandler for ChannelHandler {
    async fn handle_line(&mut self, line: &[u8]) {
        let _ = self.tx.send(line.to_vec());
    }
}

fn manager<O: PortOpener + 'static>(
    opener: O,
) -> (
    SerialLinkManager<O, ChannelHandler>,
    mpsc::UnboundedReceiver<Vec<u8>>,
    Arc<LinkMetrics>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let metrics = Arc::new(LinkMetrics::new());
    let manager = SerialLinkManager::new(
        "test",
        opener,
        ChannelHandler { tx },
        DELAY,
        metrics.clone(),
    );
    (manager, rx, metrics)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn forwards_lines_in_order_without_line_endings() {
    let opener = ScriptedOpener::new(vec![Ok(b"A\t1\r\nB\t\xff\nC\t3\n".to_vec())]);
    let (manager, mut rx, _metrics) = manager(opener);
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    assert_eq!(rx.recv().await.expect("line"), b"A\t1".to_vec());
    assert_eq!(rx.recv().await.expect("line"), b"B\t\xff".to_vec());
    assert_eq!(rx.recv().await.expect("line"), b"C\t3".to_vec());

    cancel.cancel();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn failure_streak_logs_once_and_waits_between_attempts() {
    let opener = ScriptedOpener::new(vec![
        Err("busy".to_string()),
        Err("busy".to_string()),
        Err("busy".to_string()),
        Ok(b"A\t1\n".to_vec()),
    ]);
    let (manager, mut rx, metrics) = manager(opener);
    let mut status = manager.status();
    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let handle = manager.spawn(cancel.clone());

    assert_eq!(rx.recv().await.expect("line"), b"A\t1".to_vec());
    assert!(started.elapsed() >= DELAY * 3);
    assert!(started.elapsed() < DELAY * 4);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.connect_attempts, 4);
    assert_eq!(snapshot.connect_failures, 3);
    assert_eq!(snapshot.connect_failures_logged, 1);

    // EOF 视为读取失败：固定延迟后重连到空闲流。
    wait_until(|| metrics.snapshot().connect_attempts == 5).await;
    assert_eq!(metrics.snapshot().read_failures, 1);
    status
        .wait_for(|s| s.state == LinkState::Connected)
        .await
        .expect("connected");
    assert!(started.elapsed() >= DELAY * 4);

    cancel.cancel();
    handle.await.expect("join");
    assert_eq!(status.borrow().state, LinkState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_failure_logging() {
    let opener = ScriptedOpener::new(vec![
        Err("busy".to_string()),
        Ok(b"A\t1\n".to_vec()),
        Err("gone".to_string()),
        Err("gone".to_string()),
    ]);
    let (manager, mut rx, metrics) = manager(opener);
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    rx.recv().await.expect("line");
    wait_until(|| metrics.snapshot().connect_attempts == 5).await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.connect_failures, 3);
    assert_eq!(snapshot.connect_failures_logged, 2);
    assert_eq!(snapshot.read_failures, 1);

    cancel.cancel();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn read_failure_clears_last_line() {
    let opener = ScriptedOpener::new(vec![Ok(b"A\t1\n".to_vec()), Err("gone".to_string())]);
    let (manager, mut rx, metrics) = manager(opener);
    let mut status = manager.status();
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    rx.recv().await.expect("line");
    wait_until(|| metrics.snapshot().read_failures == 1).await;
    let current = status
        .wait_for(|s| s.state == LinkState::Disconnected)
        .await
        .expect("disconnected")
        .clone();
    assert_eq!(current.last_line, None);

    cancel.cancel();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_reconnect_delay() {
    let (manager, _rx, metrics) = manager(FailingOpener);
    let status = manager.status();
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    wait_until(|| metrics.snapshot().connect_failures >= 1).await;
    let attempts = metrics.snapshot().connect_attempts;
    cancel.cancel();
    handle.await.expect("join");

    assert_eq!(status.borrow().state, LinkState::Stopped);
    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(metrics.snapshot().connect_attempts, attempts);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_blocking_read() {
    let opener = ScriptedOpener::new(Vec::new());
    let (manager, _rx, _metrics) = manager(opener);
    let mut status = manager.status();
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    status
        .wait_for(|s| s.state == LinkState::Connected)
        .await
        .expect("connected");
    cancel.cancel();
    handle.await.expect("join");
    assert_eq!(status.borrow().state, LinkState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn oversized_line_is_discarded_and_stream_continues() {
    let mut bytes = vec![b'X'; MAX_LINE_BYTES * 4];
    bytes.extend_from_slice(b"\nA\t1\n");
    let opener = ScriptedOpener::new(vec![Ok(bytes)]);
    let (manager, mut rx, metrics) = manager(opener);
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    assert_eq!(rx.recv().await.expect("line"), b"A\t1".to_vec());
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.lines_rejected, 1);
    assert_eq!(snapshot.lines_received, 1);

    cancel.cancel();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn line_at_exact_limit_is_forwarded() {
    let mut bytes = b"V\t".to_vec();
    bytes.resize(MAX_LINE_BYTES - 1, b'1');
    bytes.push(b'\n');
    let opener = ScriptedOpener::new(vec![Ok(bytes)]);
    let (manager, mut rx, metrics) = manager(opener);
    let cancel = CancellationToken::new();
    let handle = manager.spawn(cancel.clone());

    let line = rx.recv().await.expect("line");
    assert_eq!(line.len(), MAX_LINE_BYTES - 1);
    assert_eq!(metrics.snapshot().lines_rejected, 0);

    cancel.cancel();
    handle.await.expect("join");
}
