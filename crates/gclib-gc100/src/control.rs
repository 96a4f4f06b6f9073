//! Control channel: the one TCP connection that carries every command.
//!
//! [`ControlChannel`] encodes a [`Command`], queues it for the IO task and
//! waits for the decoded reply. Commands run strictly one at a time in the
//! order they were submitted; the protocol has no request identifiers, so
//! this ordering is the only way replies are matched to requests.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use gclib_core::error::{Error, Result};
use gclib_core::events::Notification;
use gclib_core::transport::Transport;
use gclib_transport::TcpTransport;

use crate::commands::Command;
use crate::io::{spawn_io_task, ControlIo, IoConfig};
use crate::protocol::Response;

/// TCP port of the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 4998;

/// Default time allowed for a command's reply.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default window in which a reply-less command may still fail.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(100);

/// Options for a [`ControlChannel`].
#[derive(Debug, Clone)]
pub struct ControlOptions {
    /// Timeout for individual command replies.
    pub command_timeout: Duration,
    /// How long a command without a reply waits for an error line.
    pub settle_timeout: Duration,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Buffer size of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            connect_timeout: gclib_transport::DEFAULT_CONNECT_TIMEOUT,
            notification_capacity: 64,
        }
    }
}

/// Lifecycle state of a [`ControlChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Connected, no exchange on the wire.
    Idle,
    /// An exchange is in progress.
    Busy,
    /// Closed by the caller or by the peer. Terminal.
    Disconnected,
}

/// The control connection to one gateway.
///
/// Safe to share between tasks (`Arc<ControlChannel>`); concurrent
/// [`execute`](ControlChannel::execute) calls queue up in FIFO order.
pub struct ControlChannel {
    host: String,
    io: ControlIo,
    notify_tx: broadcast::Sender<Notification>,
    options: ControlOptions,
}

impl ControlChannel {
    /// Connect to `host:port` with default options.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_options(host, port, ControlOptions::default()).await
    }

    /// Connect with custom options.
    pub async fn connect_with_options(
        host: &str,
        port: u16,
        options: ControlOptions,
    ) -> Result<Self> {
        debug!(host, port, "connecting control channel");
        let transport =
            TcpTransport::connect_with_timeout(host, port, options.connect_timeout).await?;
        info!(host, port, "control channel connected");
        Ok(Self::from_transport(Box::new(transport), host, options))
    }

    /// Run the control channel over an already-open transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_transport(
        transport: Box<dyn Transport>,
        host: &str,
        options: ControlOptions,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(options.notification_capacity.max(1));
        let io = spawn_io_task(
            transport,
            IoConfig {
                settle_timeout: options.settle_timeout,
            },
            notify_tx.clone(),
        );
        Self {
            host: host.to_string(),
            io,
            notify_tx,
            options,
        }
    }

    /// Run `command` with the default command timeout.
    ///
    /// Returns the reply lines: one for single-reply commands, the items of
    /// a list, or at most an echo for commands the device does not answer.
    pub async fn execute(&self, command: &Command) -> Result<Vec<Response>> {
        self.execute_with_timeout(command, self.options.command_timeout)
            .await
    }

    /// Run `command`, waiting at most `timeout` for its reply.
    ///
    /// Argument errors surface as [`Error::Encoding`] before anything is
    /// queued or sent.
    pub async fn execute_with_timeout(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Vec<Response>> {
        let line = command.encode()?;
        if !self.io.is_connected() {
            return Err(Error::NotConnected);
        }
        debug!(host = %self.host, command = %command, "executing");
        self.io.execute(line, command.expect(), timeout).await
    }

    /// Receive notifications seen while waiting for replies.
    ///
    /// Delivery is best-effort; lines that arrive while no command is
    /// pending are not reported.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    /// Close the connection.
    ///
    /// A command on the wire fails with [`Error::ConnectionLost`]; queued
    /// commands fail with [`Error::NotConnected`]. Calling this again is a
    /// no-op.
    pub async fn disconnect(&self) {
        if self.io.is_connected() {
            info!(host = %self.host, "closing control channel");
        }
        self.io.shutdown().await;
    }

    pub fn is_connected(&self) -> bool {
        self.io.is_connected()
    }

    pub fn state(&self) -> ChannelState {
        if !self.io.is_connected() {
            ChannelState::Disconnected
        } else if self.io.is_busy() {
            ChannelState::Busy
        } else {
            ChannelState::Idle
        }
    }

    /// Host name or address this channel was opened for.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn options(&self) -> &ControlOptions {
        &self.options
    }
}
