//! TCP plumbing for gclib.
//!
//! [`TcpTransport`] implements [`Transport`](gclib_core::Transport) over a
//! gateway's control socket. [`open_stream`] is the connect routine shared
//! with the serial data channels, and [`map_io_error`] keeps their error
//! classification identical.

pub mod tcp;

pub use tcp::{
    map_connect_error, map_io_error, open_stream, TcpTransport, DEFAULT_CONNECT_TIMEOUT,
};
