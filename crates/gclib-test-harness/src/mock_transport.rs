//! Mock transport for deterministic testing of the control channel.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test command encoding, reply
//! correlation, and response decoding without a gateway on the network.
//!
//! # Example
//!
//! ```
//! use gclib_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends this line, answer with this one.
//! mock.expect(b"getversion,1\r", b"version,1,3.0-12\r");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gclib_core::error::{Error, Result};
use gclib_core::transport::Transport;

/// What the mock does after a matching `send()`.
#[derive(Debug, Clone)]
enum Reaction {
    /// Return these bytes from subsequent `receive()` calls.
    Respond(Vec<u8>),
    /// Report the peer as gone on the next `receive()`.
    Disconnect,
}

/// A pre-loaded request/reaction pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    reaction: Reaction,
}

/// Shared log of every `send()` payload, readable after the mock has been
/// moved into a control channel.
pub type SentLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// A mock [`Transport`] for testing protocol engines without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the
/// corresponding response is then returned by the following `receive()`
/// calls. `receive()` with nothing pending returns [`Error::Timeout`]
/// immediately.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    pending: VecDeque<u8>,
    /// Set when the current exchange ends with the peer closing.
    peer_closed: bool,
    connected: bool,
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: VecDeque::new(),
            peer_closed: false,
            connected: true,
            sent_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, the following
    /// `receive()` calls return `response`. An empty response models a
    /// command the device does not answer.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reaction: Reaction::Respond(response.to_vec()),
        });
    }

    /// Expect `request`, then behave as if the device closed the socket.
    pub fn expect_disconnect(&mut self, request: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reaction: Reaction::Disconnect,
        });
    }

    /// Queue bytes that arrive without any request (unsolicited lines).
    pub fn push_unsolicited(&mut self, data: &[u8]) {
        self.pending.extend(data.iter().copied());
    }

    /// A handle to the log of all data sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call. The handle
    /// stays valid after the mock is boxed and handed to a channel.
    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent_log)
    }

    /// Copy of all data sent so far.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if let Ok(mut log) = self.sent_log.lock() {
            log.push(data.to_vec());
        }

        let expectation = self
            .expectations
            .pop_front()
            .ok_or_else(|| Error::Protocol("no more expectations in mock transport".into()))?;

        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }

        match expectation.reaction {
            Reaction::Respond(bytes) => self.pending.extend(bytes),
            Reaction::Disconnect => self.peer_closed = true,
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if self.pending.is_empty() {
            if self.peer_closed {
                return Err(Error::ConnectionLost);
            }
            return Err(Error::Timeout);
        }

        let n = self.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
