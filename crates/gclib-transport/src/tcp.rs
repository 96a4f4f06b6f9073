//! TCP connections to a gateway.
//!
//! Every GC-100 channel is a plain TCP socket: the control channel on port
//! 4998 and one data channel per serial module from 4999 up. [`open_stream`]
//! is the shared connect routine for both; [`TcpTransport`] wraps the
//! control socket behind the [`Transport`] trait.
//!
//! # Example
//!
//! ```no_run
//! use gclib_transport::TcpTransport;
//! use gclib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> gclib_core::Result<()> {
//! let mut control = TcpTransport::connect("192.168.1.70", 4998).await?;
//! control.send(b"get_NET,0:1\r").await?;
//!
//! let mut buf = [0u8; 512];
//! let n = control.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use gclib_core::error::{Error, Result};
use gclib_core::transport::Transport;

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `host:port`, giving up after `timeout`.
///
/// Refusal, unreachable hosts and expiry of `timeout` all come back as
/// [`Error::Transport`] naming the endpoint. Nagle is disabled on the
/// returned stream.
pub async fn open_stream(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let endpoint = format!("{host}:{port}");
    debug!(endpoint = %endpoint, timeout_ms = timeout.as_millis(), "opening socket");

    let stream = match tokio::time::timeout(timeout, TcpStream::connect(endpoint.as_str())).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(endpoint = %endpoint, error = %e, "connect failed");
            return Err(map_connect_error(e, &endpoint));
        }
        Err(_) => {
            warn!(endpoint = %endpoint, "connect timed out");
            return Err(Error::Transport(format!("connection timed out: {endpoint}")));
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(endpoint = %endpoint, error = %e, "TCP_NODELAY not set");
    }
    Ok(stream)
}

/// The control socket of one gateway.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` once closed.
    stream: Option<TcpStream>,
    endpoint: String,
}

impl TcpTransport {
    /// Connect with [`DEFAULT_CONNECT_TIMEOUT`].
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = open_stream(host, port, timeout).await?;
        let endpoint = format!("{host}:{port}");
        info!(endpoint = %endpoint, "control socket open");
        Ok(Self {
            stream: Some(stream),
            endpoint,
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(map_io_error)?;
        stream.flush().await.map_err(map_io_error)?;
        trace!(
            endpoint = %self.endpoint,
            bytes = data.len(),
            data = %String::from_utf8_lossy(data).escape_debug(),
            "tx"
        );
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(map_io_error)?;

        if n == 0 {
            warn!(endpoint = %self.endpoint, "gateway closed the control socket");
            return Err(Error::ConnectionLost);
        }
        trace!(
            endpoint = %self.endpoint,
            bytes = n,
            data = %String::from_utf8_lossy(&buf[..n]).escape_debug(),
            "rx"
        );
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.shutdown().await {
            debug!(endpoint = %self.endpoint, error = %e, "shutdown failed, dropping socket");
        }
        info!(endpoint = %self.endpoint, "control socket closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Classify an error from `connect`.
pub fn map_connect_error(e: std::io::Error, endpoint: &str) -> Error {
    match e.kind() {
        ErrorKind::ConnectionRefused => Error::Transport(format!("connection refused: {endpoint}")),
        ErrorKind::TimedOut => Error::Transport(format!("connection timed out: {endpoint}")),
        ErrorKind::AddrNotAvailable | ErrorKind::InvalidInput => {
            Error::Transport(format!("bad address {endpoint}: {e}"))
        }
        _ => Error::Io(e),
    }
}

/// Classify an error from an established socket. Anything that means the
/// peer is gone becomes [`Error::ConnectionLost`].
pub fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
