//! Transport trait for gateway communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a gateway's
//! control port. The production implementation is `TcpTransport` from
//! `gclib-transport`; `MockTransport` from `gclib-test-harness` provides
//! scripted exchanges for deterministic unit tests of the control channel.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a gateway.
///
/// Implementations handle the physical link only. Line framing and reply
/// correlation are the job of the protocol engine that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes.
    ///
    /// Returns once all bytes have been handed to the underlying socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if nothing
    /// arrives, and [`Error::ConnectionLost`](crate::error::Error::ConnectionLost)
    /// if the peer closed the connection.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected). Closing
    /// twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
