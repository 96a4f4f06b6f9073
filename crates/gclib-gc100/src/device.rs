//! `Gc100` -- device-level operations on a GC-100 gateway.
//!
//! Wraps a [`ControlChannel`] and turns each operation into one command
//! exchange, checking that the reply has the shape the operation needs.
//! Also hands out [`SerialChannel`]s for the unit's serial modules.
//!
//! Connector addresses are trusted: the facade does not check that the
//! module at an address is provisioned for the requested function. The
//! device reports misuse through error lines instead.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use gclib_core::error::{Error, Result};
use gclib_core::events::Notification;
use gclib_core::types::{ConnectorAddress, DeviceInfo, IrMode, NetworkConfig, SerialConfig};

use crate::commands::{Command, IrCommand};
use crate::control::{ControlChannel, ControlOptions, DEFAULT_CONTROL_PORT};
use crate::protocol::Response;
use crate::serial::{SerialChannel, SerialOptions};

/// Successful end of an IR transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrComplete {
    pub addr: ConnectorAddress,
    /// Transaction tag of the completed command.
    pub id: u16,
}

/// A connected GC-100.
///
/// Cloning is cheap; clones share the control connection.
#[derive(Clone)]
pub struct Gc100 {
    control: Arc<ControlChannel>,
}

impl Gc100 {
    /// Connect to the control port of `host` with default options.
    pub async fn connect(host: &str) -> Result<Self> {
        let control = ControlChannel::connect_with_options(
            host,
            DEFAULT_CONTROL_PORT,
            ControlOptions::default(),
        )
        .await?;
        Ok(Self::new(control))
    }

    pub fn new(control: ControlChannel) -> Self {
        Self {
            control: Arc::new(control),
        }
    }

    /// The underlying control channel.
    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    pub fn host(&self) -> &str {
        self.control.host()
    }

    /// Run a raw command.
    pub async fn execute(&self, command: &Command) -> Result<Vec<Response>> {
        self.control.execute(command).await
    }

    /// Run a command that answers with exactly one line.
    async fn single(&self, command: Command) -> Result<Response> {
        let timeout = self.control.options().command_timeout;
        self.single_with_timeout(command, timeout).await
    }

    async fn single_with_timeout(&self, command: Command, timeout: Duration) -> Result<Response> {
        let mut replies = self.control.execute_with_timeout(&command, timeout).await?;
        replies
            .pop()
            .ok_or_else(|| Error::Protocol(format!("no reply to {}", command.verb())))
    }

    /// Transmit an IR code and wait for it to finish.
    ///
    /// Uses the default transaction tag, one repetition and the default
    /// repeat offset. See [`send_ir_command`](Gc100::send_ir_command) for
    /// full control.
    pub async fn send_ir(
        &self,
        addr: ConnectorAddress,
        frequency: u32,
        cycles: &[u32],
    ) -> Result<IrComplete> {
        self.send_ir_command(IrCommand::new(addr, frequency, cycles))
            .await
    }

    /// Transmit an IR command and wait for `completeir`.
    ///
    /// The wait is the command timeout plus the code's
    /// [`airtime`](IrCommand::airtime), so long or repeated codes are not
    /// cut off while the emitter is still busy.
    pub async fn send_ir_command(&self, ir: IrCommand) -> Result<IrComplete> {
        let timeout = self
            .control
            .options()
            .command_timeout
            .saturating_add(ir.airtime());
        self.send_ir_command_with_timeout(ir, timeout).await
    }

    /// Like [`send_ir_command`](Gc100::send_ir_command) with an explicit
    /// bound on the wait for `completeir`.
    pub async fn send_ir_command_with_timeout(
        &self,
        ir: IrCommand,
        timeout: Duration,
    ) -> Result<IrComplete> {
        let want = ir.addr;
        match self.single_with_timeout(Command::SendIr(ir), timeout).await? {
            Response::CompleteIr { addr, id } if addr == want => Ok(IrComplete { addr, id }),
            other => Err(unexpected("completeir", want, other)),
        }
    }

    /// Stop an IR transmission in progress.
    pub async fn stop_ir(&self, addr: ConnectorAddress) -> Result<()> {
        self.control.execute(&Command::StopIr { addr }).await?;
        Ok(())
    }

    pub async fn get_network(&self) -> Result<NetworkConfig> {
        match self.single(Command::GetNet).await? {
            Response::Network(cfg) => Ok(cfg),
            other => Err(unexpected("NET", ConnectorAddress::UNIT, other)),
        }
    }

    /// Change the unit's network settings. Takes effect after the unit
    /// restarts.
    pub async fn set_network(&self, config: &NetworkConfig) -> Result<()> {
        self.control.execute(&Command::SetNet(*config)).await?;
        Ok(())
    }

    /// Convenience for a static address.
    pub async fn set_static_ip(
        &self,
        ip: Ipv4Addr,
        subnet: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Result<()> {
        let current = self.get_network().await?;
        self.set_network(&NetworkConfig {
            locked: current.locked,
            mode: gclib_core::types::AddressMode::Static,
            ip,
            subnet,
            gateway,
        })
        .await
    }

    /// Turn the unit's identification LED blinking on or off.
    pub async fn blink(&self, on: bool) -> Result<()> {
        self.control.execute(&Command::Blink { on }).await?;
        Ok(())
    }

    /// Firmware version text of a module (1-based index).
    pub async fn get_version(&self, module: u8) -> Result<String> {
        match self.single(Command::GetVersion { module }).await? {
            Response::Version { text, .. } => Ok(text),
            other => Err(unexpected("version", ConnectorAddress::UNIT, other)),
        }
    }

    /// List the installed modules.
    pub async fn get_devices(&self) -> Result<Vec<DeviceInfo>> {
        let replies = self.control.execute(&Command::GetDevices).await?;
        replies
            .into_iter()
            .map(|r| match r {
                Response::Device(info) => Ok(info),
                other => Err(unexpected("device", ConnectorAddress::UNIT, other)),
            })
            .collect()
    }

    pub async fn get_ir_mode(&self, addr: ConnectorAddress) -> Result<IrMode> {
        match self.single(Command::GetIr { addr }).await? {
            Response::IrMode { addr: got, mode } if got == addr => Ok(mode),
            other => Err(unexpected("IR", addr, other)),
        }
    }

    pub async fn set_ir_mode(&self, addr: ConnectorAddress, mode: IrMode) -> Result<()> {
        self.control.execute(&Command::SetIr { addr, mode }).await?;
        Ok(())
    }

    pub async fn get_serial_config(&self, addr: ConnectorAddress) -> Result<SerialConfig> {
        match self.single(Command::GetSerial { addr }).await? {
            Response::Serial { addr: got, config } if got == addr => Ok(config),
            other => Err(unexpected("SERIAL", addr, other)),
        }
    }

    pub async fn set_serial_config(
        &self,
        addr: ConnectorAddress,
        config: &SerialConfig,
    ) -> Result<()> {
        self.control
            .execute(&Command::SetSerial {
                addr,
                config: *config,
            })
            .await?;
        Ok(())
    }

    /// Read a digital input or relay. `true` means closed/active.
    pub async fn get_state(&self, addr: ConnectorAddress) -> Result<bool> {
        self.state_reply(Command::GetState { addr }, addr).await
    }

    /// Switch a relay and return the state the device reports back.
    pub async fn set_relay(&self, addr: ConnectorAddress, on: bool) -> Result<bool> {
        self.state_reply(Command::SetState { addr, on }, addr).await
    }

    async fn state_reply(&self, command: Command, addr: ConnectorAddress) -> Result<bool> {
        match self.single(command).await? {
            Response::State { addr: got, on } if got == addr => Ok(on),
            other => Err(unexpected("state", addr, other)),
        }
    }

    /// Notifications seen on the control channel while waiting for replies.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.control.subscribe()
    }

    pub async fn disconnect(&self) {
        self.control.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_connected()
    }

    /// A data channel for serial module `index` (zero-based) at `addr`.
    /// Not connected yet.
    pub fn serial(&self, addr: ConnectorAddress, index: u8) -> SerialChannel {
        self.serial_with_options(addr, index, SerialOptions::default())
    }

    pub fn serial_with_options(
        &self,
        addr: ConnectorAddress,
        index: u8,
        options: SerialOptions,
    ) -> SerialChannel {
        SerialChannel::new(self.host(), addr, index, options)
    }
}

fn unexpected(want: &str, addr: ConnectorAddress, got: Response) -> Error {
    Error::Protocol(format!("expected {want} for {addr}, got {got:?}"))
}
