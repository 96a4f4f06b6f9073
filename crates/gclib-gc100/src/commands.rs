//! Command construction and encoding for the GC-100 control protocol.
//!
//! A [`Command`] is one request line. [`Command::encode`] validates the
//! arguments and produces the exact bytes to transmit, CR included; it
//! never touches the network. [`Command::parse`] is the inverse and accepts
//! any line `encode` can produce.
//!
//! Each command also knows what answer to wait for ([`Command::expect`]):
//! a single reply line, a list closed by an end marker, or nothing at all
//! (the device only speaks up on error).

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use gclib_core::error::{Error, Result};
use gclib_core::types::{
    AddressMode, ConnectorAddress, FlowControl, IrMode, NetworkConfig, Parity, SerialConfig,
    SUPPORTED_BAUD_RATES,
};

use crate::protocol::{self, SEPARATOR, TERMINATOR};

/// Lowest carrier frequency the IR modules accept, in Hz.
pub const MIN_FREQUENCY_HZ: u32 = 15_000;
/// Highest carrier frequency the IR modules accept, in Hz.
pub const MAX_FREQUENCY_HZ: u32 = 500_000;
/// Highest repeat count for `sendir`.
pub const MAX_REPEAT: u16 = 50;
/// Fewest on/off values in a `sendir` (one pair).
pub const MIN_TRANSITIONS: usize = 2;
/// Most on/off values in a `sendir`.
pub const MAX_TRANSITIONS: usize = 256;
/// Largest single on/off cycle count.
pub const MAX_CYCLES: u32 = 65_535;
/// Transaction tag used when the caller does not pick one.
pub const DEFAULT_IR_ID: u16 = 1;

pub const VERB_GET_DEVICES: &str = "getdevices";
pub const VERB_GET_VERSION: &str = "getversion";
pub const VERB_GET_NET: &str = "get_NET";
pub const VERB_SET_NET: &str = "set_NET";
pub const VERB_GET_IR: &str = "get_IR";
pub const VERB_SET_IR: &str = "set_IR";
pub const VERB_GET_SERIAL: &str = "get_SERIAL";
pub const VERB_SET_SERIAL: &str = "set_SERIAL";
pub const VERB_GET_STATE: &str = "getstate";
pub const VERB_SET_STATE: &str = "setstate";
pub const VERB_SEND_IR: &str = "sendir";
pub const VERB_STOP_IR: &str = "stopir";
pub const VERB_BLINK: &str = "blink";

/// An IR transmission request (`sendir`).
///
/// `cycles` alternates on and off durations, each counted in carrier
/// cycles, starting with an on period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrCommand {
    pub addr: ConnectorAddress,
    /// Transaction tag echoed back in `completeir` and `busyIR`.
    pub id: u16,
    /// Carrier frequency in Hz.
    pub frequency: u32,
    /// Number of times the sequence is sent.
    pub repeat: u16,
    /// 1-based index into `cycles` where repeats restart. `None` picks the
    /// default for the sequence length.
    pub offset: Option<u16>,
    pub cycles: Vec<u32>,
}

impl IrCommand {
    /// A single transmission with the default tag and offset.
    pub fn new(addr: ConnectorAddress, frequency: u32, cycles: impl Into<Vec<u32>>) -> Self {
        IrCommand {
            addr,
            id: DEFAULT_IR_ID,
            frequency,
            repeat: 1,
            offset: None,
            cycles: cycles.into(),
        }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn with_repeat(mut self, repeat: u16) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The offset that will be sent.
    pub fn effective_offset(&self) -> u16 {
        self.offset
            .unwrap_or_else(|| default_offset(self.cycles.len()))
    }

    /// How long the emitter is busy with this command: one full pass, then
    /// `repeat - 1` passes from the offset to the end. `completeir` only
    /// arrives after the last one.
    pub fn airtime(&self) -> Duration {
        if self.frequency == 0 {
            return Duration::ZERO;
        }
        let sum = |from: usize| -> u64 {
            self.cycles
                .iter()
                .skip(from)
                .map(|&c| u64::from(c))
                .sum()
        };
        let restart = usize::from(self.effective_offset().saturating_sub(1));
        let repeats = u64::from(self.repeat.saturating_sub(1));
        let total = sum(0).saturating_add(sum(restart).saturating_mul(repeats));
        let nanos = u128::from(total) * 1_000_000_000 / u128::from(self.frequency);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Check every argument against what the IR modules accept.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency) {
            return Err(Error::Encoding(format!(
                "carrier frequency {} Hz outside {}..={} Hz",
                self.frequency, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ
            )));
        }
        if !(1..=MAX_REPEAT).contains(&self.repeat) {
            return Err(Error::Encoding(format!(
                "repeat count {} outside 1..={}",
                self.repeat, MAX_REPEAT
            )));
        }

        let len = self.cycles.len();
        if len % 2 != 0 {
            return Err(Error::Encoding(format!(
                "odd number of IR transitions ({len})"
            )));
        }
        if !(MIN_TRANSITIONS..=MAX_TRANSITIONS).contains(&len) {
            return Err(Error::Encoding(format!(
                "{len} IR transitions, expected {MIN_TRANSITIONS}..={MAX_TRANSITIONS}"
            )));
        }
        if let Some(bad) = self
            .cycles
            .iter()
            .find(|&&c| c == 0 || c > MAX_CYCLES)
        {
            return Err(Error::Encoding(format!(
                "cycle count {bad} outside 1..={MAX_CYCLES}"
            )));
        }

        let offset = self.effective_offset();
        if offset % 2 == 0 || usize::from(offset) >= len {
            return Err(Error::Encoding(format!(
                "repeat offset {offset} must be odd and below {len}"
            )));
        }
        Ok(())
    }
}

/// Default repeat offset: skip the first pair (usually a lead-in) when
/// there is more than one pair.
pub fn default_offset(transitions: usize) -> u16 {
    if transitions >= 4 {
        3
    } else {
        1
    }
}

/// What a command waits for after it is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// One reply line with this prefix.
    Reply(&'static str),
    /// Zero or more `item` lines followed by an `end` line.
    List {
        item: &'static str,
        end: &'static str,
    },
    /// No reply is required. Wait a short window for an error line, or for
    /// an optional echo that ends the window early.
    Settle { echo: Option<&'static str> },
}

/// A request line for the control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetDevices,
    GetVersion { module: u8 },
    GetNet,
    SetNet(NetworkConfig),
    GetIr { addr: ConnectorAddress },
    SetIr { addr: ConnectorAddress, mode: IrMode },
    GetSerial { addr: ConnectorAddress },
    SetSerial {
        addr: ConnectorAddress,
        config: SerialConfig,
    },
    GetState { addr: ConnectorAddress },
    SetState { addr: ConnectorAddress, on: bool },
    SendIr(IrCommand),
    StopIr { addr: ConnectorAddress },
    Blink { on: bool },
}

impl Command {
    /// The verb (first field) of the command line.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::GetDevices => VERB_GET_DEVICES,
            Command::GetVersion { .. } => VERB_GET_VERSION,
            Command::GetNet => VERB_GET_NET,
            Command::SetNet(_) => VERB_SET_NET,
            Command::GetIr { .. } => VERB_GET_IR,
            Command::SetIr { .. } => VERB_SET_IR,
            Command::GetSerial { .. } => VERB_GET_SERIAL,
            Command::SetSerial { .. } => VERB_SET_SERIAL,
            Command::GetState { .. } => VERB_GET_STATE,
            Command::SetState { .. } => VERB_SET_STATE,
            Command::SendIr(_) => VERB_SEND_IR,
            Command::StopIr { .. } => VERB_STOP_IR,
            Command::Blink { .. } => VERB_BLINK,
        }
    }

    /// The reply shape that ends this command's exchange.
    pub fn expect(&self) -> Expect {
        match self {
            Command::GetDevices => Expect::List {
                item: protocol::PREFIX_DEVICE,
                end: protocol::PREFIX_END_LIST_DEVICES,
            },
            Command::GetVersion { .. } => Expect::Reply(protocol::PREFIX_VERSION),
            Command::GetNet => Expect::Reply(protocol::PREFIX_NET),
            Command::SetNet(_) => Expect::Settle {
                echo: Some(protocol::PREFIX_NET),
            },
            Command::GetIr { .. } => Expect::Reply(protocol::PREFIX_IR),
            Command::SetIr { .. } => Expect::Settle {
                echo: Some(protocol::PREFIX_IR),
            },
            Command::GetSerial { .. } => Expect::Reply(protocol::PREFIX_SERIAL),
            Command::SetSerial { .. } => Expect::Settle {
                echo: Some(protocol::PREFIX_SERIAL),
            },
            Command::GetState { .. } | Command::SetState { .. } => {
                Expect::Reply(protocol::PREFIX_STATE)
            }
            Command::SendIr(_) => Expect::Reply(protocol::PREFIX_COMPLETE_IR),
            Command::StopIr { .. } => Expect::Settle {
                echo: Some(protocol::PREFIX_STOP_IR),
            },
            Command::Blink { .. } => Expect::Settle { echo: None },
        }
    }

    /// Check the arguments without encoding.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::GetVersion { module: 0 } => Err(Error::Encoding(
                "module index for getversion must be at least 1".into(),
            )),
            Command::SetSerial { config, .. }
                if !SUPPORTED_BAUD_RATES.contains(&config.baud_rate) =>
            {
                Err(Error::Encoding(format!(
                    "unsupported baud rate {}",
                    config.baud_rate
                )))
            }
            Command::SendIr(ir) => ir.validate(),
            _ => Ok(()),
        }
    }

    /// Arguments after the verb, rendered as wire tokens.
    fn args(&self) -> Vec<String> {
        match self {
            Command::GetDevices => Vec::new(),
            Command::GetNet => vec![ConnectorAddress::UNIT.to_string()],
            Command::GetVersion { module } => vec![module.to_string()],
            Command::SetNet(cfg) => vec![
                ConnectorAddress::UNIT.to_string(),
                protocol::lock_token(cfg.locked).to_string(),
                cfg.mode.as_str().to_string(),
                cfg.ip.to_string(),
                cfg.subnet.to_string(),
                cfg.gateway.to_string(),
            ],
            Command::GetIr { addr }
            | Command::GetSerial { addr }
            | Command::GetState { addr }
            | Command::StopIr { addr } => vec![addr.to_string()],
            Command::SetIr { addr, mode } => vec![addr.to_string(), mode.as_str().to_string()],
            Command::SetSerial { addr, config } => vec![
                addr.to_string(),
                config.baud_rate.to_string(),
                config.flow_control.as_str().to_string(),
                config.parity.as_str().to_string(),
            ],
            Command::SetState { addr, on } => vec![addr.to_string(), flag(*on).to_string()],
            Command::SendIr(ir) => {
                let mut args = Vec::with_capacity(5 + ir.cycles.len());
                args.push(ir.addr.to_string());
                args.push(ir.id.to_string());
                args.push(ir.frequency.to_string());
                args.push(ir.repeat.to_string());
                args.push(ir.effective_offset().to_string());
                args.extend(ir.cycles.iter().map(u32::to_string));
                args
            }
            Command::Blink { on } => vec![flag(*on).to_string()],
        }
    }

    /// Validate and encode the complete line, terminator included.
    ///
    /// ```
    /// use gclib_core::ConnectorAddress;
    /// use gclib_gc100::commands::Command;
    ///
    /// let cmd = Command::GetState { addr: ConnectorAddress::new(3, 1) };
    /// assert_eq!(cmd.encode().unwrap(), b"getstate,3:1\r");
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let args = self.args();
        let len = self.verb().len() + args.iter().map(|a| a.len() + 1).sum::<usize>() + 1;

        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(self.verb().as_bytes());
        for arg in &args {
            buf.put_u8(SEPARATOR as u8);
            buf.put_slice(arg.as_bytes());
        }
        buf.put_u8(TERMINATOR);
        Ok(buf.to_vec())
    }

    /// Parse a command line, with or without its terminator.
    pub fn parse(line: &str) -> Result<Command> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
        let bad = || Error::Encoding(format!("malformed command line: {line:?}"));

        let cmd = match fields.as_slice() {
            [VERB_GET_DEVICES] => Command::GetDevices,
            [VERB_GET_VERSION, module] => Command::GetVersion {
                module: module.parse().map_err(|_| bad())?,
            },
            [VERB_GET_NET, _] | [VERB_GET_NET] => Command::GetNet,
            [VERB_SET_NET, _, lock, mode, ip, subnet, gateway] => Command::SetNet(NetworkConfig {
                locked: match *lock {
                    "LOCKED" => true,
                    "UNLOCKED" => false,
                    _ => return Err(bad()),
                },
                mode: mode.parse::<AddressMode>().map_err(Error::Encoding)?,
                ip: parse_ip(ip).ok_or_else(bad)?,
                subnet: parse_ip(subnet).ok_or_else(bad)?,
                gateway: parse_ip(gateway).ok_or_else(bad)?,
            }),
            [VERB_GET_IR, addr] => Command::GetIr {
                addr: parse_addr(addr)?,
            },
            [VERB_SET_IR, addr, mode] => Command::SetIr {
                addr: parse_addr(addr)?,
                mode: mode.parse().map_err(Error::Encoding)?,
            },
            [VERB_GET_SERIAL, addr] => Command::GetSerial {
                addr: parse_addr(addr)?,
            },
            [VERB_SET_SERIAL, addr, baud, flow, parity] => Command::SetSerial {
                addr: parse_addr(addr)?,
                config: SerialConfig {
                    baud_rate: baud.parse().map_err(|_| bad())?,
                    flow_control: flow.parse::<FlowControl>().map_err(Error::Encoding)?,
                    parity: parity.parse::<Parity>().map_err(Error::Encoding)?,
                },
            },
            [VERB_GET_STATE, addr] => Command::GetState {
                addr: parse_addr(addr)?,
            },
            [VERB_SET_STATE, addr, value] => Command::SetState {
                addr: parse_addr(addr)?,
                on: parse_flag(value).ok_or_else(bad)?,
            },
            [VERB_SEND_IR, addr, id, frequency, repeat, offset, cycles @ ..] => {
                let cycles = cycles
                    .iter()
                    .map(|c| c.parse::<u32>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| bad())?;
                Command::SendIr(IrCommand {
                    addr: parse_addr(addr)?,
                    id: id.parse().map_err(|_| bad())?,
                    frequency: frequency.parse().map_err(|_| bad())?,
                    repeat: repeat.parse().map_err(|_| bad())?,
                    offset: Some(offset.parse().map_err(|_| bad())?),
                    cycles,
                })
            }
            [VERB_STOP_IR, addr] => Command::StopIr {
                addr: parse_addr(addr)?,
            },
            [VERB_BLINK, value] => Command::Blink {
                on: parse_flag(value).ok_or_else(bad)?,
            },
            _ => return Err(bad()),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

impl fmt::Display for Command {
    /// The command line without its terminator, arguments unvalidated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        for arg in self.args() {
            write!(f, "{SEPARATOR}{arg}")?;
        }
        Ok(())
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_addr(value: &str) -> Result<ConnectorAddress> {
    value
        .parse()
        .map_err(|e: gclib_core::types::ParseAddressError| Error::Encoding(e.to_string()))
}

fn parse_ip(value: &str) -> Option<Ipv4Addr> {
    value.parse().ok()
}
