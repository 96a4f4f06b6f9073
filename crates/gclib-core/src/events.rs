//! Unsolicited notification lines.
//!
//! The gateway can emit lines that are not replies to any command: sensor
//! state changes on connectors set to `SENSOR_NOTIFY`, and `busyIR` when an
//! IR connector is still transmitting. The control channel publishes these
//! through a `tokio::sync::broadcast` channel when it sees them while
//! waiting for a reply. Delivery is best-effort; with no subscribers the
//! notification is dropped.

use crate::types::ConnectorAddress;

/// An unsolicited line received on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A sensor input changed state (`statechange,<addr>,<0|1>`).
    StateChange {
        /// Connector that changed.
        addr: ConnectorAddress,
        /// `true` if the input is now active.
        on: bool,
    },

    /// An IR connector rejected a transmission because it is still busy
    /// with an earlier one (`busyIR,<addr>,<id>`).
    BusyIr {
        /// Busy connector.
        addr: ConnectorAddress,
        /// Transaction tag of the rejected command.
        id: u16,
    },
}

impl Notification {
    /// Connector address the notification refers to.
    pub fn addr(&self) -> ConnectorAddress {
        match self {
            Notification::StateChange { addr, .. } | Notification::BusyIr { addr, .. } => *addr,
        }
    }
}
