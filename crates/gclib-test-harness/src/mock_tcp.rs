//! Mock TCP server that stands in for a gateway.
//!
//! [`MockTcpServer`] listens on a random localhost port and plays a scripted
//! device: either a control port that answers expected command lines with
//! canned replies (optionally after a delay), or a serial data port that
//! echoes every byte back.
//!
//! # Example
//!
//! ```
//! use gclib_test_harness::MockTcpServer;
//!
//! # async fn example() -> gclib_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // When the client sends "getversion,1\r", respond with a version line.
//! server.expect(b"getversion,1\r", b"version,1,3.0-12\r");
//! server.start();
//!
//! let addr = server.addr();
//! // ... connect and test ...
//! # Ok(())
//! # }
//! ```

use gclib_core::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A pre-loaded request/response pair for the mock TCP server.
#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact bytes we expect the client to send.
    request: Vec<u8>,
    /// The bytes to send back when the matching request is received.
    response: Vec<u8>,
    /// How long the simulated device takes before answering.
    delay: Duration,
}

/// A mock TCP server for testing the engine over real sockets.
///
/// Accepts a single connection. In scripted mode it processes expectations
/// in order and then keeps the connection open until the client closes it;
/// in echo mode it writes every received byte straight back.
///
/// If the client sends data that does not match the next expectation, the
/// server task ends with an error and drops the connection.
pub struct MockTcpServer {
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    /// Listener, moved into the server task on start.
    listener: Option<TcpListener>,
    /// Ordered queue of expected request/response pairs.
    expectations: Vec<TcpExpectation>,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Create a new mock server listening on a random localhost port.
    ///
    /// Connections are not accepted until one of the `start` methods is
    /// called, so expectations can be loaded first.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: Vec::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair, answered immediately.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expect_delayed(request, response, Duration::ZERO);
    }

    /// Add an expected request/response pair, answered after `delay`.
    pub fn expect_delayed(&mut self, request: &[u8], response: &[u8], delay: Duration) {
        self.expectations.push(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
            delay,
        });
    }

    /// Get the `host:port` address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    /// Start the scripted device.
    ///
    /// This spawns a background task. Call [`wait`](MockTcpServer::wait)
    /// after the client has disconnected to check that every expectation
    /// was met.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations = std::mem::take(&mut self.expectations);

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                read_exact(&mut stream, &mut buf)
                    .await
                    .map_err(|e| format!("expectation {}: {}", i, e))?;

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:?}, got {:?}",
                        i,
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(&buf)
                    ));
                }

                if !expectation.delay.is_zero() {
                    tokio::time::sleep(expectation.delay).await;
                }

                stream
                    .write_all(&expectation.response)
                    .await
                    .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
            }

            // Script done: hold the socket until the client hangs up.
            let mut sink = [0u8; 256];
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        return Err(format!(
                            "unexpected data after script: {:?}",
                            String::from_utf8_lossy(&sink[..n])
                        ));
                    }
                }
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Start an echo device: every byte received is written straight back
    /// until the client closes the connection.
    pub fn start_echo(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            let mut buf = [0u8; 1024];
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| format!("echo read error: {}", e))?;
                if n == 0 {
                    return Ok(());
                }
                stream
                    .write_all(&buf[..n])
                    .await
                    .map_err(|e| format!("echo write error: {}", e))?;
            }
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and return any errors.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

/// Read exactly `buf.len()` bytes or fail if the client disconnects.
async fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) -> std::result::Result<(), String> {
    let mut total_read = 0;
    while total_read < buf.len() {
        let n = stream
            .read(&mut buf[total_read..])
            .await
            .map_err(|e| format!("read error: {}", e))?;
        if n == 0 {
            return Err(format!(
                "client disconnected after {} bytes (expected {})",
                total_read,
                buf.len()
            ));
        }
        total_read += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_exchange() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"getversion,1\r", b"version,1,3.0-12\r");
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"getversion,1\r").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"version,1,3.0-12\r");

        drop(client);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_is_reported() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"getversion,1\r", b"version,1,3.0-12\r");
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"getversion,2\r").await.unwrap();

        let result = server.wait().await;
        assert!(result.unwrap_err().contains("request mismatch"));
    }

    #[tokio::test]
    async fn echo_mode() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.start_echo();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"hello\r").await.unwrap();

        let mut got = Vec::new();
        let mut buf = [0u8; 16];
        while got.len() < 6 {
            let n = client.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"hello\r");

        drop(client);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn port_matches_addr() {
        let server = MockTcpServer::new().await.unwrap();
        assert!(server.port() > 0);
        assert!(server.addr().ends_with(&format!(":{}", server.port())));
    }
}
