//! Serial data channels.
//!
//! Each serial module forwards its RS-232 port over a dedicated TCP port:
//! 4999 for the first serial module, 5000 for the second, and so on. A
//! [`SerialChannel`] is an unframed byte pipe over that socket, independent
//! of the control channel and of other serial channels.
//!
//! The socket is split into a read half and a write half with separate
//! locks, so one task can sit in [`recv`](SerialChannel::recv) while
//! another calls [`send`](SerialChannel::send).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use gclib_core::error::{Error, Result};
use gclib_core::types::ConnectorAddress;
use gclib_transport::{map_io_error, open_stream};

/// TCP port of the first serial module's data channel.
pub const DEFAULT_SERIAL_BASE_PORT: u16 = 4999;

/// Pause after every write. Back-to-back packets confuse the GC-100's
/// serial forwarder.
pub const DEFAULT_SEND_PACING: Duration = Duration::from_millis(10);

/// Data port for the serial module with zero-based `index`, or `None` if
/// it would lie beyond port 65535.
///
/// ```
/// use gclib_gc100::serial::{data_port, DEFAULT_SERIAL_BASE_PORT};
///
/// assert_eq!(data_port(DEFAULT_SERIAL_BASE_PORT, 0), Some(4999));
/// assert_eq!(data_port(DEFAULT_SERIAL_BASE_PORT, 1), Some(5000));
/// assert_eq!(data_port(65_535, 1), None);
/// ```
pub fn data_port(base_port: u16, index: u8) -> Option<u16> {
    base_port.checked_add(u16::from(index))
}

/// Options for a [`SerialChannel`].
#[derive(Debug, Clone)]
pub struct SerialOptions {
    /// Data port of serial index 0.
    pub base_port: u16,
    pub connect_timeout: Duration,
    /// Bound for [`SerialChannel::recv`]. `None` waits until data arrives
    /// or the channel closes.
    pub recv_timeout: Option<Duration>,
    /// Delay after each write.
    pub send_pacing: Duration,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_SERIAL_BASE_PORT,
            connect_timeout: gclib_transport::DEFAULT_CONNECT_TIMEOUT,
            recv_timeout: None,
            send_pacing: DEFAULT_SEND_PACING,
        }
    }
}

/// One open connection.
struct Session {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    /// Cancelled on disconnect to release pending reads and writes.
    cancel: CancellationToken,
}

/// A byte stream to one serial module.
///
/// The session is created by [`connect`](SerialChannel::connect) and ended
/// by [`disconnect`](SerialChannel::disconnect) or by the peer closing the
/// socket; a later `connect` opens a fresh one.
///
/// The module at `addr` is assumed to be a serial module; nothing checks
/// this against the hardware.
pub struct SerialChannel {
    host: String,
    addr: ConnectorAddress,
    index: u8,
    port: Option<u16>,
    options: SerialOptions,
    session: Mutex<Option<Arc<Session>>>,
}

impl SerialChannel {
    /// Create a channel for the serial module at `addr`, which is serial
    /// module number `index` (zero-based) on the unit. Does not connect.
    pub fn new(host: &str, addr: ConnectorAddress, index: u8, options: SerialOptions) -> Self {
        let port = data_port(options.base_port, index);
        Self {
            host: host.to_string(),
            addr,
            index,
            port,
            options,
            session: Mutex::new(None),
        }
    }

    /// Open the data socket.
    ///
    /// Fails with [`Error::AlreadyConnected`] if a session is open, and with
    /// [`Error::Encoding`] if `base_port + index` is not a valid port.
    pub async fn connect(&self) -> Result<()> {
        let port = self.port.ok_or_else(|| {
            Error::Encoding(format!(
                "serial index {} is out of range for base port {}",
                self.index, self.options.base_port
            ))
        })?;

        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let stream = open_stream(&self.host, port, self.options.connect_timeout).await?;
        let (reader, writer) = stream.into_split();

        *slot = Some(Arc::new(Session {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            cancel: CancellationToken::new(),
        }));
        info!(addr = %self.addr, port, "serial channel connected");
        Ok(())
    }

    /// Write `data` verbatim.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let session = self.session().await?;
        let pacing = self.options.send_pacing;

        let write = async {
            let mut writer = session.writer.lock().await;
            writer.write_all(data).await.map_err(map_io_error)?;
            trace!(addr = %self.addr, bytes = data.len(), "serial send");
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            Ok::<(), Error>(())
        };

        let result = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(Error::ConnectionLost),
            r = write => r,
        };
        self.end_on_connection_error(&session, &result).await;
        result
    }

    /// Wait for data and return up to `max_len` bytes of it.
    ///
    /// Returns as soon as anything is available; a message may arrive over
    /// several calls. Bounded by [`SerialOptions::recv_timeout`] if set.
    pub async fn recv(&self, max_len: usize) -> Result<Vec<u8>> {
        match self.options.recv_timeout {
            Some(timeout) => self.recv_with_timeout(max_len, timeout).await,
            None => self.recv_inner(max_len).await,
        }
    }

    /// Like [`recv`](SerialChannel::recv) but fails with [`Error::Timeout`]
    /// after `timeout`. A timed-out read leaves the session intact.
    pub async fn recv_with_timeout(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        tokio::time::timeout(timeout, self.recv_inner(max_len))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn recv_inner(&self, max_len: usize) -> Result<Vec<u8>> {
        if max_len == 0 {
            return Err(Error::Encoding("receive length must be positive".into()));
        }
        let session = self.session().await?;

        let read = async {
            let mut reader = session.reader.lock().await;
            let mut buf = vec![0u8; max_len];
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(addr = %self.addr, "serial peer closed connection");
                    Err(Error::ConnectionLost)
                }
                Ok(n) => {
                    buf.truncate(n);
                    trace!(addr = %self.addr, bytes = n, "serial recv");
                    Ok(buf)
                }
                Err(e) => Err(map_io_error(e)),
            }
        };

        let result = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(Error::ConnectionLost),
            r = read => r,
        };
        self.end_on_connection_error(&session, &result).await;
        result
    }

    /// Close the data socket.
    ///
    /// Pending `send` and `recv` calls fail with [`Error::ConnectionLost`].
    /// Does nothing if the channel is not connected.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            self.close_session(&session).await;
            info!(addr = %self.addr, port = ?self.port, "serial channel closed");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Connector address of the serial module.
    pub fn address(&self) -> ConnectorAddress {
        self.addr
    }

    /// Zero-based serial module index.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// TCP port of the data channel; `None` when the index runs past the
    /// last port.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn session(&self) -> Result<Arc<Session>> {
        self.session.lock().await.clone().ok_or(Error::NotConnected)
    }

    async fn close_session(&self, session: &Session) {
        session.cancel.cancel();
        // Pending operations drop their half guards once they see the cancel.
        let mut writer = session.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(addr = %self.addr, error = %e, "error shutting down serial socket");
        }
    }

    /// A socket failure ends the session it happened on.
    async fn end_on_connection_error<T>(&self, session: &Arc<Session>, result: &Result<T>) {
        let Err(e) = result else {
            return;
        };
        if !matches!(e, Error::ConnectionLost | Error::Io(_)) {
            return;
        }

        let mut slot = self.session.lock().await;
        let current = slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session));
        if current {
            slot.take();
            drop(slot);
            debug!(addr = %self.addr, error = %e, "serial session ended");
            self.close_session(session).await;
        }
    }
}
