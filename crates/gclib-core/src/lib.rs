//! gclib-core: core types, errors, and the transport trait for gclib.
//!
//! This crate holds the protocol-agnostic vocabulary shared by the transport,
//! the GC-100 protocol engine, and the test harness.
//!
//! # Key types
//!
//! - [`ConnectorAddress`] -- `module:port` address of a physical connector
//! - [`Transport`] -- byte-level communication channel
//! - [`Notification`] -- unsolicited lines seen on the control channel
//! - [`Error`] / [`Result`] / [`CommandError`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{CommandError, Error, ErrorCategory, Result};
pub use events::Notification;
pub use transport::Transport;
pub use types::*;
