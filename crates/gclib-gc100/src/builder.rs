//! Gc100Builder -- fluent builder for [`Gc100`] connections.
//!
//! # Example
//!
//! ```no_run
//! use gclib_gc100::builder::Gc100Builder;
//! use std::time::Duration;
//!
//! # async fn example() -> gclib_core::Result<()> {
//! let gc = Gc100Builder::new("192.168.1.70")
//!     .command_timeout(Duration::from_secs(5))
//!     .build()
//!     .await?;
//! println!("{:?}", gc.get_devices().await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use gclib_core::error::Result;
use gclib_core::transport::Transport;

use crate::control::{ControlChannel, ControlOptions, DEFAULT_CONTROL_PORT};
use crate::device::Gc100;

/// Fluent builder for [`Gc100`].
///
/// Defaults: control port 4998 and [`ControlOptions::default`].
#[derive(Debug, Clone)]
pub struct Gc100Builder {
    host: String,
    port: u16,
    options: ControlOptions,
}

impl Gc100Builder {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_CONTROL_PORT,
            options: ControlOptions::default(),
        }
    }

    /// Control port (default 4998).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Timeout for individual command replies.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// How long commands without a reply wait for an error line.
    pub fn settle_timeout(mut self, timeout: Duration) -> Self {
        self.options.settle_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Buffer size of the notification channel.
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.options.notification_capacity = capacity;
        self
    }

    /// Build over an already-open transport.
    ///
    /// Used for testing with a `MockTransport`, or for custom transports.
    /// Must be called from within a tokio runtime.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Gc100 {
        Gc100::new(ControlChannel::from_transport(
            transport,
            &self.host,
            self.options,
        ))
    }

    /// Open the control connection.
    pub async fn build(self) -> Result<Gc100> {
        let control =
            ControlChannel::connect_with_options(&self.host, self.port, self.options).await?;
        Ok(Gc100::new(control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gclib_test_harness::{MockTcpServer, MockTransport};

    #[test]
    fn builder_defaults() {
        let b = Gc100Builder::new("10.0.0.5");
        assert_eq!(b.host, "10.0.0.5");
        assert_eq!(b.port, 4998);
        assert_eq!(b.options.command_timeout, Duration::from_secs(2));
    }

    #[test]
    fn builder_setters() {
        let b = Gc100Builder::new("gc100.local")
            .port(14998)
            .command_timeout(Duration::from_millis(750))
            .settle_timeout(Duration::from_millis(20))
            .connect_timeout(Duration::from_secs(1))
            .notification_capacity(8);
        assert_eq!(b.port, 14998);
        assert_eq!(b.options.command_timeout, Duration::from_millis(750));
        assert_eq!(b.options.settle_timeout, Duration::from_millis(20));
        assert_eq!(b.options.connect_timeout, Duration::from_secs(1));
        assert_eq!(b.options.notification_capacity, 8);
    }

    #[tokio::test]
    async fn build_with_mock_transport() {
        let mut mock = MockTransport::new();
        mock.expect(b"getversion,1\r", b"version,1,3.0-12\r");

        let gc = Gc100Builder::new("mock").build_with_transport(Box::new(mock));
        assert_eq!(gc.host(), "mock");
        assert_eq!(gc.get_version(1).await.unwrap(), "3.0-12");
        gc.disconnect().await;
    }

    #[tokio::test]
    async fn build_over_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"blink,0\r", b"");
        server.start();

        let gc = Gc100Builder::new("127.0.0.1")
            .port(server.port())
            .settle_timeout(Duration::from_millis(30))
            .build()
            .await
            .unwrap();
        gc.blink(false).await.unwrap();

        gc.disconnect().await;
        server.wait().await.unwrap();
    }
}
