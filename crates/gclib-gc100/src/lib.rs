//! Protocol engine for Global Cache GC-100 network gateways.
//!
//! A GC-100 exposes IR emitters, relays, sensor inputs and serial ports
//! behind one text control connection (TCP 4998) plus one raw data
//! connection per serial module (TCP 4999 and up).
//!
//! # Architecture
//!
//! - [`protocol`] -- CR line framing and response classification
//! - [`commands`] -- command encoding, decoding and IR argument checks
//! - [`io`] -- the IO task that owns the control transport
//! - [`control`] -- [`ControlChannel`], one command at a time over the IO task
//! - [`serial`] -- [`SerialChannel`], unframed byte streams to serial modules
//! - [`device`] -- [`Gc100`], typed device-level operations
//! - [`builder`] -- [`Gc100Builder`]

pub mod builder;
pub mod commands;
pub mod control;
pub mod device;
pub mod io;
pub mod protocol;
pub mod serial;

pub use builder::Gc100Builder;
pub use commands::{Command, Expect, IrCommand};
pub use control::{ChannelState, ControlChannel, ControlOptions, DEFAULT_CONTROL_PORT};
pub use device::{Gc100, IrComplete};
pub use protocol::{LineKind, Response, ResponseLine};
pub use serial::{data_port, SerialChannel, SerialOptions, DEFAULT_SERIAL_BASE_PORT};
