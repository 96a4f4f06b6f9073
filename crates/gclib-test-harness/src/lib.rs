//! gclib-test-harness: mock transports and simulated gateways for testing
//! gclib.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the control channel without a network, and [`MockTcpServer`] for tests
//! that need a real socket peer (scripted control port or echoing serial
//! data port).

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::{MockTransport, SentLog};
