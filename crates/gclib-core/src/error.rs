//! Error types for gclib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Encoding, transport, timeout, and
//! device-reported failures are all captured here.

use std::fmt;

use crate::types::ConnectorAddress;

/// The error type for all gclib operations.
///
/// The variants fall into four groups:
///
/// - [`Encoding`](Error::Encoding): arguments that cannot be expressed in
///   the wire grammar, detected before any I/O.
/// - Connection errors ([`Transport`](Error::Transport),
///   [`NotConnected`](Error::NotConnected),
///   [`AlreadyConnected`](Error::AlreadyConnected),
///   [`ConnectionLost`](Error::ConnectionLost), [`Io`](Error::Io)):
///   see [`Error::is_connection_error`].
/// - [`Timeout`](Error::Timeout): no matching reply within the bound.
/// - [`Command`](Error::Command): the device itself reported a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arguments cannot be represented in the wire grammar.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A transport-level error (refused connection, bad address).
    #[error("transport error: {0}")]
    Transport(String),

    /// A well-formed reply arrived but did not have the shape the
    /// operation requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a reply from the device.
    #[error("timeout waiting for response")]
    Timeout,

    /// The device answered with an error line.
    #[error("device error: {0}")]
    Command(CommandError),

    /// No connection has been established, or it was closed.
    #[error("not connected")]
    NotConnected,

    /// `connect()` was called on a session that is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection was closed while an operation was waiting on it.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a socket-level failure rather than a
    /// device-reported, encoding, or timeout error.
    ///
    /// The engine never reconnects on its own; callers use this to decide
    /// whether a fresh connection is needed before retrying.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::NotConnected
                | Error::AlreadyConnected
                | Error::ConnectionLost
                | Error::Io(_)
        )
    }

    /// The device-reported error, if this is one.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            Error::Command(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Error::Command(e)
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a device error code.
///
/// Codes are mapped through a fixed table taken from the GC-100 API
/// documentation. Codes outside the table map to [`ErrorCategory::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Code 1: the command was not terminated with CR in time.
    CrTimeout,
    /// Codes 2, 3: the module address does not exist.
    InvalidModule,
    /// Code 4: invalid connector address.
    InvalidConnector,
    /// Codes 5, 6, 7: IR command sent to a connector set to sensor input.
    SensorConnector,
    /// Code 8: repeat offset points at an even transition.
    EvenOffset,
    /// Codes 9, 15: more than 256 IR transitions.
    TooManyTransitions,
    /// Codes 10, 16: odd number of IR transitions.
    OddTransitions,
    /// Code 11: contact-closure command sent to a non-relay module.
    NotRelayModule,
    /// Code 12: missing CR.
    MissingCr,
    /// Code 13: state request to an invalid or non-sensor address.
    InvalidSensorAddress,
    /// Codes 14, 23: unsupported command.
    UnsupportedCommand,
    /// Code 21: IR command sent to a non-IR module.
    NotIrModule,
    /// Any code not in the table.
    Device,
}

impl ErrorCategory {
    /// Map a numeric device error code to its category.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => ErrorCategory::CrTimeout,
            2 | 3 => ErrorCategory::InvalidModule,
            4 => ErrorCategory::InvalidConnector,
            5..=7 => ErrorCategory::SensorConnector,
            8 => ErrorCategory::EvenOffset,
            9 | 15 => ErrorCategory::TooManyTransitions,
            10 | 16 => ErrorCategory::OddTransitions,
            11 => ErrorCategory::NotRelayModule,
            12 => ErrorCategory::MissingCr,
            13 => ErrorCategory::InvalidSensorAddress,
            14 | 23 => ErrorCategory::UnsupportedCommand,
            21 => ErrorCategory::NotIrModule,
            _ => ErrorCategory::Device,
        }
    }

    /// Human-readable description of the category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::CrTimeout => "timeout: CR not received",
            ErrorCategory::InvalidModule => "invalid module address",
            ErrorCategory::InvalidConnector => "invalid connector address",
            ErrorCategory::SensorConnector => "IR command sent to a sensor-in connector",
            ErrorCategory::EvenOffset => "offset set to an even transition number",
            ErrorCategory::TooManyTransitions => "exceeded maximum IR transitions",
            ErrorCategory::OddTransitions => "non-even number of IR transitions",
            ErrorCategory::NotRelayModule => "contact-closure command sent to non-relay module",
            ErrorCategory::MissingCr => "missing CR",
            ErrorCategory::InvalidSensorAddress => {
                "state request to invalid or non-sensor address"
            }
            ErrorCategory::UnsupportedCommand => "unsupported command",
            ErrorCategory::NotIrModule => "IR command sent to non-IR module",
            ErrorCategory::Device => "device error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A failure reported by the device through an error response line.
///
/// Distinct from transport-level failures: the connection is still healthy
/// and the control channel remains usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    code: u16,
    raw_code: String,
    address: Option<ConnectorAddress>,
    line: String,
}

impl CommandError {
    /// Create a command error from its decoded parts.
    ///
    /// `raw_code` is the code text exactly as received (e.g. `"001"`);
    /// `line` is the complete response line without the terminator.
    pub fn new(
        code: u16,
        raw_code: impl Into<String>,
        address: Option<ConnectorAddress>,
        line: impl Into<String>,
    ) -> Self {
        CommandError {
            code,
            raw_code: raw_code.into(),
            address,
            line: line.into(),
        }
    }

    /// Numeric error code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Error code text as sent by the device, leading zeros preserved.
    pub fn raw_code(&self) -> &str {
        &self.raw_code
    }

    /// Connector address named in the error line, if any.
    pub fn address(&self) -> Option<ConnectorAddress> {
        self.address
    }

    /// The complete error line.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Category looked up from the code.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(addr) => write!(f, "({}) {} at {}", self.raw_code, self.category(), addr),
            None => write!(f, "({}) {}", self.raw_code, self.category()),
        }
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_encoding() {
        let e = Error::Encoding("odd number of IR transitions".into());
        assert_eq!(e.to_string(), "encoding error: odd number of IR transitions");
    }

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("connection refused: 10.0.0.5:4998".into());
        assert_eq!(
            e.to_string(),
            "transport error: connection refused: 10.0.0.5:4998"
        );
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout;
        assert_eq!(e.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_command() {
        let e = Error::Command(CommandError::new(1, "001", None, "ERR,001"));
        assert_eq!(e.to_string(), "device error: (001) timeout: CR not received");
    }

    #[test]
    fn command_error_with_address() {
        let addr = ConnectorAddress::new(2, 1);
        let e = CommandError::new(21, "021", Some(addr), "ERR_2:1,021");
        assert_eq!(e.to_string(), "(021) IR command sent to non-IR module at 2:1");
        assert_eq!(e.address(), Some(addr));
        assert_eq!(e.line(), "ERR_2:1,021");
    }

    #[test]
    fn category_table() {
        assert_eq!(ErrorCategory::from_code(1), ErrorCategory::CrTimeout);
        assert_eq!(ErrorCategory::from_code(3), ErrorCategory::InvalidModule);
        assert_eq!(ErrorCategory::from_code(4), ErrorCategory::InvalidConnector);
        assert_eq!(ErrorCategory::from_code(6), ErrorCategory::SensorConnector);
        assert_eq!(ErrorCategory::from_code(8), ErrorCategory::EvenOffset);
        assert_eq!(ErrorCategory::from_code(15), ErrorCategory::TooManyTransitions);
        assert_eq!(ErrorCategory::from_code(16), ErrorCategory::OddTransitions);
        assert_eq!(ErrorCategory::from_code(11), ErrorCategory::NotRelayModule);
        assert_eq!(ErrorCategory::from_code(23), ErrorCategory::UnsupportedCommand);
        assert_eq!(ErrorCategory::from_code(21), ErrorCategory::NotIrModule);
    }

    #[test]
    fn unknown_code_keeps_raw_code() {
        let e = CommandError::new(99, "099", None, "ERR,099");
        assert_eq!(e.category(), ErrorCategory::Device);
        assert_eq!(e.code(), 99);
        assert_eq!(e.raw_code(), "099");
    }

    #[test]
    fn connection_error_grouping() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionLost.is_connection_error());
        assert!(Error::AlreadyConnected.is_connection_error());
        assert!(Error::Transport("refused".into()).is_connection_error());
        assert!(!Error::Timeout.is_connection_error());
        assert!(!Error::Encoding("bad".into()).is_connection_error());
        assert!(!Error::Command(CommandError::new(1, "1", None, "unknowncommand 1"))
            .is_connection_error());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.is_connection_error());
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn command_error_accessor() {
        let e: Error = CommandError::new(14, "14", None, "unknowncommand 14").into();
        let inner = e.command_error().unwrap();
        assert_eq!(inner.category(), ErrorCategory::UnsupportedCommand);
        assert!(Error::Timeout.command_error().is_none());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
