//! # gclib -- async control of Global Cache GC-100 gateways
//!
//! `gclib` talks to GC-100 network adapters: it sends infrared codes,
//! switches relays, reads sensor inputs, changes network and port settings,
//! and opens byte streams to the unit's serial ports.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! gclib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Send an IR code:
//!
//! ```no_run
//! use gclib::{ConnectorAddress, Gc100Builder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gc = Gc100Builder::new("192.168.1.70").build().await?;
//!
//!     let addr = ConnectorAddress::new(2, 1);
//!     let done = gc
//!         .send_ir(addr, 38_000, &[341, 170, 21, 21, 21, 64, 21, 1517])
//!         .await?;
//!     println!("IR complete on {} (id {})", done.addr, done.id);
//!
//!     gc.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                          |
//! |----------------------|--------------------------------------------------|
//! | `gclib-core`         | Errors, connector addresses, value types, [`Transport`] trait |
//! | `gclib-transport`    | TCP transport                                    |
//! | `gclib-gc100`        | Wire codec, control channel, serial channels, [`Gc100`] |
//! | **`gclib`**          | This facade crate -- re-exports everything       |
//!
//! ## Control and data channels
//!
//! All commands go over one control connection (TCP 4998) and run strictly
//! one at a time: the protocol carries no request identifiers, so replies
//! are matched to commands by order alone. [`Gc100`] and
//! [`ControlChannel`] can be shared between tasks; concurrent calls queue.
//!
//! Each serial module has its own data connection (TCP 4999 for the first,
//! 5000 for the second, ...). A [`SerialChannel`] is an unframed byte pipe,
//! independent of the control channel:
//!
//! ```no_run
//! use gclib::{ConnectorAddress, Gc100Builder};
//!
//! # async fn example() -> gclib::Result<()> {
//! let gc = Gc100Builder::new("192.168.1.70").build().await?;
//! let serial = gc.serial(ConnectorAddress::new(1, 1), 0);
//! serial.connect().await?;
//! serial.send(b"PWR ON\r").await?;
//! let reply = serial.recv(80).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every operation returns [`Result<T>`]. [`Error::Command`] carries the
//! device's own error code and category and leaves the connection usable;
//! [`Error::is_connection_error`] tells socket failures apart. Nothing is
//! retried or reconnected automatically.

pub use gclib_core::*;

pub use gclib_gc100::{
    data_port, ChannelState, Command, ControlChannel, ControlOptions, Expect, Gc100,
    Gc100Builder, IrCommand, IrComplete, LineKind, Response, ResponseLine, SerialChannel,
    SerialOptions, DEFAULT_CONTROL_PORT, DEFAULT_SERIAL_BASE_PORT,
};

pub use gclib_transport::TcpTransport;

/// Wire-level access: line framing, response classification, command
/// encoding.
pub mod protocol {
    pub use gclib_gc100::commands;
    pub use gclib_gc100::protocol::*;
}
