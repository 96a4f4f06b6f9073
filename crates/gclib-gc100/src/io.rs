//! IO task for the control channel.
//!
//! One tokio task owns the control transport exclusively. Callers hand it
//! encoded command lines through a FIFO queue; the task runs one exchange at
//! a time (send, then read lines until the expected reply, an error line, or
//! the deadline), so a reply can never be matched to the wrong request.
//!
//! Between exchanges the task keeps reading so that stray lines do not pile
//! up in the socket. Notifications seen during an exchange are published on
//! a broadcast channel; lines read while idle are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use gclib_core::error::{Error, Result};
use gclib_core::events::Notification;
use gclib_core::transport::Transport;

use crate::commands::Expect;
use crate::protocol::{self, LineResult, Response, ResponseLine, MAX_BUF};

/// Extra time a caller waits beyond the exchange timeout, covering the hop
/// through the queue.
const REPLY_GRACE: Duration = Duration::from_millis(500);

/// How long one idle read waits before the loop checks its queue again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Depth of the request queue.
const QUEUE_DEPTH: usize = 32;

/// Configuration for the control IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// How long a reply-less command waits for an error line.
    pub settle_timeout: Duration,
}

/// A request sent from the control channel to the IO task.
pub struct Request {
    /// Encoded command line, terminator included.
    pub line: Vec<u8>,
    pub expect: Expect,
    /// Bound for this exchange once it is on the wire.
    pub timeout: Duration,
    pub reply: oneshot::Sender<Result<Vec<Response>>>,
}

/// Handle to the IO task.
pub struct ControlIo {
    tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl ControlIo {
    /// Queue a command line and wait for the outcome of its exchange.
    ///
    /// If the returned future is dropped before the line has been sent, the
    /// request is skipped. Once sent, the exchange runs to completion in the
    /// task regardless, so its reply is never left for the next request.
    pub async fn execute(
        &self,
        line: Vec<u8>,
        expect: Expect,
        timeout: Duration,
    ) -> Result<Vec<Response>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request {
                line,
                expect,
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(timeout.saturating_add(REPLY_GRACE), reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Whether the task is still running with a live transport.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether an exchange is on the wire right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stop the task and close the transport. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Spawn the IO task. Returns the handle for queueing commands.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    notify_tx: broadcast::Sender<Notification>,
) -> ControlIo {
    let (tx, rx) = mpsc::channel::<Request>(QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let connected = Arc::new(AtomicBool::new(true));
    let busy = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(io_loop(
        transport,
        config,
        notify_tx,
        rx,
        cancel.clone(),
        Arc::clone(&connected),
        Arc::clone(&busy),
    ));

    ControlIo {
        tx,
        cancel,
        task: Mutex::new(Some(task)),
        connected,
        busy,
    }
}

enum Wake {
    Cancelled,
    Request(Option<Request>),
    Idle { closed: bool },
}

/// Clears the connected flag when the IO task ends, however it ends.
struct ConnectedFlag(Arc<AtomicBool>);

impl ConnectedFlag {
    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConnectedFlag {
    fn drop(&mut self) {
        self.clear();
    }
}

/// The main IO loop.
///
/// Priorities, highest first: cancellation, queued requests, idle reads.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    notify_tx: broadcast::Sender<Notification>,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
) {
    let connected = ConnectedFlag(connected);
    // Survives across exchanges: a partial line belongs to whoever reads next.
    let mut buf = Vec::new();

    loop {
        let wake = tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Cancelled,
            req = rx.recv() => Wake::Request(req),
            closed = idle_read(&mut *transport, &mut buf) => Wake::Idle { closed },
        };

        match wake {
            Wake::Cancelled => {
                debug!("control IO task cancelled");
                break;
            }
            Wake::Request(None) => {
                debug!("request queue closed, exiting control IO task");
                break;
            }
            Wake::Request(Some(req)) => {
                if req.reply.is_closed() {
                    debug!("caller gone before send, skipping request");
                    continue;
                }

                busy.store(true, Ordering::SeqCst);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::ConnectionLost),
                    r = execute_exchange(
                        &mut *transport,
                        &mut buf,
                        &req.line,
                        req.expect,
                        req.timeout,
                        &config,
                        &notify_tx,
                    ) => r,
                };
                busy.store(false, Ordering::SeqCst);

                let lost = matches!(result, Err(Error::ConnectionLost | Error::NotConnected));
                let _ = req.reply.send(result);
                if lost {
                    break;
                }
            }
            Wake::Idle { closed: true } => break,
            Wake::Idle { closed: false } => {}
        }
    }

    connected.clear();

    rx.close();
    while let Ok(req) = rx.try_recv() {
        let _ = req.reply.send(Err(Error::NotConnected));
    }

    if let Err(e) = transport.close().await {
        debug!(error = %e, "error closing control transport");
    }
}

/// One read while no exchange is pending. Returns `true` if the connection
/// is gone.
async fn idle_read(transport: &mut dyn Transport, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 256];
    match transport.receive(&mut chunk, IDLE_POLL).await {
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            drain_idle_lines(buf);
            false
        }
        Err(Error::ConnectionLost | Error::NotConnected) => {
            warn!("control connection closed by peer");
            true
        }
        Err(_) => {
            // Timeout or transient error: yield so the loop can look at its
            // queue and cancellation again.
            tokio::time::sleep(Duration::from_millis(10)).await;
            false
        }
    }
}

/// Discard complete lines that arrived with no exchange pending.
fn drain_idle_lines(buf: &mut Vec<u8>) {
    while let LineResult::Line { text, consumed } = protocol::decode_line(buf) {
        buf.drain(..consumed);
        if !text.is_empty() {
            debug!(line = %text, "discarding line received while idle");
        }
    }
    guard_overflow(buf);
}

fn guard_overflow(buf: &mut Vec<u8>) {
    if buf.len() > MAX_BUF {
        warn!(len = buf.len(), "line buffer overflow, resetting");
        buf.clear();
    }
}

enum Step {
    Done,
    Continue,
}

/// Fold one reply line into the exchange.
fn accept(expect: Expect, resp: Response, collected: &mut Vec<Response>) -> Step {
    let prefix = resp.prefix();
    match expect {
        Expect::Reply(want) if prefix == want => {
            collected.push(resp);
            Step::Done
        }
        Expect::List { item, .. } if prefix == item => {
            collected.push(resp);
            Step::Continue
        }
        Expect::List { end, .. } if prefix == end => Step::Done,
        Expect::Settle { echo: Some(want) } if prefix == want => {
            collected.push(resp);
            Step::Done
        }
        _ => {
            debug!(prefix, "skipping unexpected response");
            Step::Continue
        }
    }
}

/// What an exchange returns when its window closes without a terminating
/// line.
fn on_deadline(expect: Expect, collected: Vec<Response>) -> Result<Vec<Response>> {
    match expect {
        Expect::Settle { .. } => Ok(collected),
        _ => Err(Error::Timeout),
    }
}

/// `now + window`, or roughly thirty years out when that would overflow
/// (`Duration::MAX` asks for no bound).
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Run one command/response exchange on the transport.
///
/// Sends `line`, then reads until a terminating line for `expect`, an error
/// line, or the deadline. Reply-less commands (`Expect::Settle`) only wait
/// `settle_timeout`, and silence counts as success.
async fn execute_exchange(
    transport: &mut dyn Transport,
    buf: &mut Vec<u8>,
    line: &[u8],
    expect: Expect,
    timeout: Duration,
    config: &IoConfig,
    notify_tx: &broadcast::Sender<Notification>,
) -> Result<Vec<Response>> {
    drain_idle_lines(buf);

    trace!(
        bytes = line.len(),
        line = %String::from_utf8_lossy(line).trim_end(),
        "sending command"
    );
    transport.send(line).await?;

    let window = match expect {
        Expect::Settle { .. } => config.settle_timeout.min(timeout),
        _ => timeout,
    };
    let deadline = deadline_after(window);
    let mut collected = Vec::new();
    let mut recv_buf = [0u8; 512];

    loop {
        while let LineResult::Line { text, consumed } = protocol::decode_line(buf) {
            buf.drain(..consumed);
            if text.is_empty() {
                continue;
            }
            trace!(line = %text, "received line");

            match protocol::classify(&text) {
                ResponseLine::Reply(resp) => {
                    if let Step::Done = accept(expect, resp, &mut collected) {
                        return Ok(collected);
                    }
                }
                ResponseLine::Error(e) => {
                    debug!(code = e.code(), line = e.line(), "device reported error");
                    return Err(Error::Command(e));
                }
                ResponseLine::Notification(n) => {
                    debug!(addr = %n.addr(), "notification during exchange");
                    let _ = notify_tx.send(n);
                }
                ResponseLine::Unrecognized(text) => {
                    debug!(line = %text, "skipping unrecognized line");
                }
            }
        }
        guard_overflow(buf);

        let now = Instant::now();
        if now >= deadline {
            return on_deadline(expect, collected);
        }

        match transport.receive(&mut recv_buf, deadline - now).await {
            Ok(n) => buf.extend_from_slice(&recv_buf[..n]),
            Err(Error::Timeout) => return on_deadline(expect, collected),
            Err(e) => return Err(e),
        }
    }
}
