//! Line framing and response decoding for the GC-100 control protocol.
//!
//! Every line in either direction is ASCII terminated by a carriage return
//! (`\r`). Fields are separated by commas; the first field names the line
//! (`completeir`, `NET`, `statechange`, ...).
//!
//! # Classification
//!
//! [`classify`] sorts a received line into a [`ResponseLine`]:
//!
//! - a [`Response`] the device sends back for a command (acknowledgement or
//!   data result),
//! - a [`CommandError`] (`unknowncommand <n>`, `ERR,<n>`, `ERR_<addr>,<n>`),
//! - an unsolicited [`Notification`] (`statechange`, `busyIR`),
//! - or `Unrecognized` for anything else. A known prefix with fields that
//!   fail to parse is also `Unrecognized`; decoding never fails.

use std::net::Ipv4Addr;

use gclib_core::error::CommandError;
use gclib_core::events::Notification;
use gclib_core::types::{
    AddressMode, ConnectorAddress, DeviceInfo, IrMode, NetworkConfig, SerialConfig,
};

/// Line terminator byte.
pub const TERMINATOR: u8 = b'\r';

/// Field separator.
pub const SEPARATOR: char = ',';

/// A line buffer that grows past this many bytes without a terminator is
/// discarded.
pub const MAX_BUF: usize = 8192;

pub const PREFIX_COMPLETE_IR: &str = "completeir";
pub const PREFIX_STOP_IR: &str = "stopir";
pub const PREFIX_DEVICE: &str = "device";
pub const PREFIX_END_LIST_DEVICES: &str = "endlistdevices";
pub const PREFIX_VERSION: &str = "version";
pub const PREFIX_NET: &str = "NET";
pub const PREFIX_IR: &str = "IR";
pub const PREFIX_SERIAL: &str = "SERIAL";
pub const PREFIX_STATE: &str = "state";
pub const PREFIX_STATE_CHANGE: &str = "statechange";
pub const PREFIX_BUSY_IR: &str = "busyIR";
pub const PREFIX_UNKNOWN_COMMAND: &str = "unknowncommand";
pub const PREFIX_ERR: &str = "ERR";

/// Result of attempting to split one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineResult {
    /// A complete line was found.
    Line {
        /// Line text without the terminator. May be empty.
        text: String,
        /// Number of bytes consumed from the buffer, terminator included.
        consumed: usize,
    },
    /// No terminator in the buffer yet.
    Incomplete,
}

/// Split the first CR-terminated line from `buf`.
///
/// Line feeds around the text are stripped so firmware that sends CRLF is
/// tolerated. Invalid UTF-8 is replaced rather than rejected; such lines
/// classify as `Unrecognized`.
///
/// ```
/// use gclib_gc100::protocol::{decode_line, LineResult};
///
/// assert_eq!(
///     decode_line(b"completeir,2:1,1\rstate"),
///     LineResult::Line { text: "completeir,2:1,1".into(), consumed: 17 },
/// );
/// assert_eq!(decode_line(b"state,1:2"), LineResult::Incomplete);
/// ```
pub fn decode_line(buf: &[u8]) -> LineResult {
    let Some(pos) = buf.iter().position(|&b| b == TERMINATOR) else {
        return LineResult::Incomplete;
    };
    let text = String::from_utf8_lossy(&buf[..pos])
        .trim_matches('\n')
        .to_string();
    LineResult::Line {
        text,
        consumed: pos + 1,
    }
}

/// Broad class of a received line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Acknowledgement,
    DataResult,
    ErrorResult,
    AsynchronousNotification,
    Unrecognized,
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `completeir,<addr>,<id>`: an IR transmission finished.
    CompleteIr { addr: ConnectorAddress, id: u16 },
    /// `stopir,<addr>`: IR transmission was stopped.
    StopIr { addr: ConnectorAddress },
    /// `device,<module>,<kind>`: one entry of the module list.
    Device(DeviceInfo),
    /// `endlistdevices`: end of the module list.
    EndListDevices,
    /// `version,<module>,<text>`.
    Version { module: u8, text: String },
    /// `NET,0:1,<lock>,<mode>,<ip>,<subnet>,<gateway>`.
    Network(NetworkConfig),
    /// `IR,<addr>,<mode>`.
    IrMode { addr: ConnectorAddress, mode: IrMode },
    /// `SERIAL,<addr>,<baud>,<flow>,<parity>`.
    Serial {
        addr: ConnectorAddress,
        config: SerialConfig,
    },
    /// `state,<addr>,<0|1>`.
    State { addr: ConnectorAddress, on: bool },
}

impl Response {
    /// The line prefix this response was decoded from.
    pub fn prefix(&self) -> &'static str {
        match self {
            Response::CompleteIr { .. } => PREFIX_COMPLETE_IR,
            Response::StopIr { .. } => PREFIX_STOP_IR,
            Response::Device(_) => PREFIX_DEVICE,
            Response::EndListDevices => PREFIX_END_LIST_DEVICES,
            Response::Version { .. } => PREFIX_VERSION,
            Response::Network(_) => PREFIX_NET,
            Response::IrMode { .. } => PREFIX_IR,
            Response::Serial { .. } => PREFIX_SERIAL,
            Response::State { .. } => PREFIX_STATE,
        }
    }

    pub fn kind(&self) -> LineKind {
        match self {
            Response::CompleteIr { .. } | Response::StopIr { .. } => LineKind::Acknowledgement,
            _ => LineKind::DataResult,
        }
    }
}

/// A classified line received on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    Reply(Response),
    Error(CommandError),
    Notification(Notification),
    Unrecognized(String),
}

impl ResponseLine {
    pub fn kind(&self) -> LineKind {
        match self {
            ResponseLine::Reply(r) => r.kind(),
            ResponseLine::Error(_) => LineKind::ErrorResult,
            ResponseLine::Notification(_) => LineKind::AsynchronousNotification,
            ResponseLine::Unrecognized(_) => LineKind::Unrecognized,
        }
    }
}

/// Classify one received line (without its terminator).
///
/// ```
/// use gclib_gc100::protocol::{classify, LineKind};
///
/// assert_eq!(classify("completeir,2:1,1").kind(), LineKind::Acknowledgement);
/// assert_eq!(classify("ERR,001").kind(), LineKind::ErrorResult);
/// assert_eq!(classify("statechange,1:3,1").kind(), LineKind::AsynchronousNotification);
/// assert_eq!(classify("hello").kind(), LineKind::Unrecognized);
/// ```
pub fn classify(line: &str) -> ResponseLine {
    if let Some(err) = parse_error(line) {
        return ResponseLine::Error(err);
    }

    let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
    let parsed = match fields[0] {
        PREFIX_STATE_CHANGE => parse_state_change(&fields).map(ResponseLine::Notification),
        PREFIX_BUSY_IR => parse_busy_ir(&fields).map(ResponseLine::Notification),
        _ => parse_response(&fields).map(ResponseLine::Reply),
    };
    parsed.unwrap_or_else(|| ResponseLine::Unrecognized(line.to_string()))
}

/// Parse an error line in any of the three forms the firmware uses.
///
/// The numeric code is taken from the digits of the code field; the field
/// itself is kept verbatim as the raw code.
pub fn parse_error(line: &str) -> Option<CommandError> {
    let (address, raw) = if let Some(rest) = line.strip_prefix(PREFIX_UNKNOWN_COMMAND) {
        (None, rest.trim_start_matches([' ', ',']).trim())
    } else if let Some(rest) = line.strip_prefix("ERR_") {
        let (addr, code) = rest.split_once(SEPARATOR)?;
        (addr.parse::<ConnectorAddress>().ok(), code.trim())
    } else if let Some(rest) = line.strip_prefix(PREFIX_ERR) {
        if !(rest.is_empty() || rest.starts_with([' ', ','])) {
            return None;
        }
        (None, rest.trim_start_matches([' ', ',']).trim())
    } else {
        return None;
    };

    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let code = digits.parse::<u16>().unwrap_or(0);
    Some(CommandError::new(code, raw, address, line))
}

fn parse_response(fields: &[&str]) -> Option<Response> {
    match fields {
        [PREFIX_COMPLETE_IR, addr, id] => Some(Response::CompleteIr {
            addr: addr.parse().ok()?,
            id: id.parse().ok()?,
        }),
        [PREFIX_STOP_IR, addr, ..] => Some(Response::StopIr {
            addr: addr.parse().ok()?,
        }),
        [PREFIX_DEVICE, module, kind] => Some(Response::Device(DeviceInfo {
            module: module.parse().ok()?,
            kind: kind.to_string(),
        })),
        [PREFIX_END_LIST_DEVICES] => Some(Response::EndListDevices),
        [PREFIX_VERSION, module, text @ ..] if !text.is_empty() => Some(Response::Version {
            module: module.parse().ok()?,
            text: text.join(","),
        }),
        [PREFIX_NET, _addr, lock, mode, ip, subnet, gateway] => {
            Some(Response::Network(NetworkConfig {
                locked: parse_lock(lock)?,
                mode: mode.parse::<AddressMode>().ok()?,
                ip: ip.parse::<Ipv4Addr>().ok()?,
                subnet: subnet.parse::<Ipv4Addr>().ok()?,
                gateway: gateway.parse::<Ipv4Addr>().ok()?,
            }))
        }
        [PREFIX_IR, addr, mode] => Some(Response::IrMode {
            addr: addr.parse().ok()?,
            mode: mode.parse().ok()?,
        }),
        [PREFIX_SERIAL, addr, baud, flow, parity] => Some(Response::Serial {
            addr: addr.parse().ok()?,
            config: SerialConfig {
                baud_rate: baud.parse().ok()?,
                flow_control: flow.parse().ok()?,
                parity: parity.parse().ok()?,
            },
        }),
        [PREFIX_STATE, addr, value] => Some(Response::State {
            addr: addr.parse().ok()?,
            on: parse_flag(value)?,
        }),
        _ => None,
    }
}

fn parse_state_change(fields: &[&str]) -> Option<Notification> {
    match fields {
        [_, addr, value] => Some(Notification::StateChange {
            addr: addr.parse().ok()?,
            on: parse_flag(value)?,
        }),
        _ => None,
    }
}

fn parse_busy_ir(fields: &[&str]) -> Option<Notification> {
    match fields {
        [_, addr, id] => Some(Notification::BusyIr {
            addr: addr.parse().ok()?,
            id: id.parse().ok()?,
        }),
        _ => None,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_lock(value: &str) -> Option<bool> {
    match value {
        "LOCKED" => Some(true),
        "UNLOCKED" => Some(false),
        _ => None,
    }
}

/// Wire token for a lock flag.
pub fn lock_token(locked: bool) -> &'static str {
    if locked {
        "LOCKED"
    } else {
        "UNLOCKED"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gclib_core::error::ErrorCategory;
    use gclib_core::types::{FlowControl, Parity};

    fn addr(module: u8, port: u8) -> ConnectorAddress {
        ConnectorAddress::new(module, port)
    }

    // -----------------------------------------------------------------------
    // decode_line
    // -----------------------------------------------------------------------

    #[test]
    fn decode_empty_buffer() {
        assert_eq!(decode_line(b""), LineResult::Incomplete);
    }

    #[test]
    fn decode_no_terminator() {
        assert_eq!(decode_line(b"completeir,2:1"), LineResult::Incomplete);
    }

    #[test]
    fn decode_single_line() {
        assert_eq!(
            decode_line(b"state,1:2,1\r"),
            LineResult::Line {
                text: "state,1:2,1".into(),
                consumed: 12,
            }
        );
    }

    #[test]
    fn decode_leaves_trailing_data() {
        let buf = b"device,1,3 IR\rdevice,2";
        match decode_line(buf) {
            LineResult::Line { text, consumed } => {
                assert_eq!(text, "device,1,3 IR");
                assert_eq!(&buf[consumed..], b"device,2");
            }
            LineResult::Incomplete => panic!("expected a line"),
        }
    }

    #[test]
    fn decode_strips_line_feeds() {
        // CRLF firmware: the LF lands at the start of the next line.
        let buf = b"stopir,1:1\r\nstate,1:2,0\r\n";
        let LineResult::Line { text, consumed } = decode_line(buf) else {
            panic!("expected a line");
        };
        assert_eq!(text, "stopir,1:1");
        let LineResult::Line { text, .. } = decode_line(&buf[consumed..]) else {
            panic!("expected a line");
        };
        assert_eq!(text, "state,1:2,0");
    }

    #[test]
    fn decode_empty_line() {
        assert_eq!(
            decode_line(b"\r"),
            LineResult::Line {
                text: String::new(),
                consumed: 1,
            }
        );
    }

    #[test]
    fn decode_invalid_utf8_is_lossy() {
        let LineResult::Line { text, .. } = decode_line(b"\xff\xfe\r") else {
            panic!("expected a line");
        };
        assert_eq!(classify(&text).kind(), LineKind::Unrecognized);
    }

    // -----------------------------------------------------------------------
    // classify: replies
    // -----------------------------------------------------------------------

    #[test]
    fn classify_complete_ir() {
        assert_eq!(
            classify("completeir,2:1,1"),
            ResponseLine::Reply(Response::CompleteIr {
                addr: addr(2, 1),
                id: 1,
            })
        );
    }

    #[test]
    fn classify_stop_ir() {
        let line = classify("stopir,4:3");
        assert_eq!(line.kind(), LineKind::Acknowledgement);
        assert_eq!(line, ResponseLine::Reply(Response::StopIr { addr: addr(4, 3) }));
    }

    #[test]
    fn classify_device_list() {
        assert_eq!(
            classify("device,3,1 SERIAL"),
            ResponseLine::Reply(Response::Device(DeviceInfo {
                module: 3,
                kind: "1 SERIAL".into(),
            }))
        );
        assert_eq!(
            classify("endlistdevices"),
            ResponseLine::Reply(Response::EndListDevices)
        );
    }

    #[test]
    fn classify_version() {
        assert_eq!(
            classify("version,1,3.0-12"),
            ResponseLine::Reply(Response::Version {
                module: 1,
                text: "3.0-12".into(),
            })
        );
    }

    #[test]
    fn classify_network() {
        let line = classify("NET,0:1,UNLOCKED,STATIC,192.168.1.70,255.255.255.0,192.168.1.1");
        assert_eq!(line.kind(), LineKind::DataResult);
        assert_eq!(
            line,
            ResponseLine::Reply(Response::Network(NetworkConfig {
                locked: false,
                mode: AddressMode::Static,
                ip: Ipv4Addr::new(192, 168, 1, 70),
                subnet: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
            }))
        );
    }

    #[test]
    fn classify_ir_mode() {
        assert_eq!(
            classify("IR,4:3,SENSOR_NOTIFY"),
            ResponseLine::Reply(Response::IrMode {
                addr: addr(4, 3),
                mode: IrMode::SensorNotify,
            })
        );
    }

    #[test]
    fn classify_serial() {
        assert_eq!(
            classify("SERIAL,1:1,19200,FLOW_HARDWARE,PARITY_ODD"),
            ResponseLine::Reply(Response::Serial {
                addr: addr(1, 1),
                config: SerialConfig {
                    baud_rate: 19200,
                    flow_control: FlowControl::Hardware,
                    parity: Parity::Odd,
                },
            })
        );
    }

    #[test]
    fn classify_state() {
        assert_eq!(
            classify("state,3:2,0"),
            ResponseLine::Reply(Response::State {
                addr: addr(3, 2),
                on: false,
            })
        );
    }

    #[test]
    fn classify_tolerates_spaces_in_fields() {
        assert_eq!(
            classify("state, 3:2, 1"),
            ResponseLine::Reply(Response::State {
                addr: addr(3, 2),
                on: true,
            })
        );
    }

    // -----------------------------------------------------------------------
    // classify: errors
    // -----------------------------------------------------------------------

    #[test]
    fn classify_err_comma_form() {
        let ResponseLine::Error(e) = classify("ERR,001") else {
            panic!("expected error");
        };
        assert_eq!(e.code(), 1);
        assert_eq!(e.raw_code(), "001");
        assert_eq!(e.category(), ErrorCategory::CrTimeout);
        assert_eq!(e.address(), None);
        assert_eq!(e.line(), "ERR,001");
    }

    #[test]
    fn classify_err_with_address() {
        let ResponseLine::Error(e) = classify("ERR_2:1,021") else {
            panic!("expected error");
        };
        assert_eq!(e.code(), 21);
        assert_eq!(e.address(), Some(addr(2, 1)));
        assert_eq!(e.category(), ErrorCategory::NotIrModule);
    }

    #[test]
    fn classify_unknowncommand() {
        let ResponseLine::Error(e) = classify("unknowncommand 14") else {
            panic!("expected error");
        };
        assert_eq!(e.code(), 14);
        assert_eq!(e.raw_code(), "14");
        assert_eq!(e.category(), ErrorCategory::UnsupportedCommand);
    }

    #[test]
    fn classify_unknown_code_keeps_raw() {
        let ResponseLine::Error(e) = classify("ERR,IR099") else {
            panic!("expected error");
        };
        assert_eq!(e.code(), 99);
        assert_eq!(e.raw_code(), "IR099");
        assert_eq!(e.category(), ErrorCategory::Device);
    }

    #[test]
    fn err_prefix_requires_separator() {
        assert_eq!(classify("ERROR_LOG").kind(), LineKind::Unrecognized);
    }

    // -----------------------------------------------------------------------
    // classify: notifications and junk
    // -----------------------------------------------------------------------

    #[test]
    fn classify_state_change() {
        assert_eq!(
            classify("statechange,1:3,1"),
            ResponseLine::Notification(Notification::StateChange {
                addr: addr(1, 3),
                on: true,
            })
        );
    }

    #[test]
    fn classify_busy_ir() {
        assert_eq!(
            classify("busyIR,2:1,7"),
            ResponseLine::Notification(Notification::BusyIr {
                addr: addr(2, 1),
                id: 7,
            })
        );
    }

    #[test]
    fn known_prefix_with_bad_fields_is_unrecognized() {
        for line in [
            "completeir,2:1",
            "completeir,x:1,1",
            "state,1:2,2",
            "NET,0:1,MAYBE,DHCP,1.2.3.4,255.0.0.0,1.2.3.1",
            "NET,0:1,LOCKED,DHCP,1.2.3",
            "SERIAL,1:1,fast,FLOW_NONE,PARITY_NO",
            "IR,1:1,LASER",
            "statechange,1:3",
            "version,1",
        ] {
            assert_eq!(
                classify(line),
                ResponseLine::Unrecognized(line.to_string()),
                "line {line:?}"
            );
        }
    }

    #[test]
    fn empty_and_unknown_lines_are_unrecognized() {
        assert_eq!(classify("").kind(), LineKind::Unrecognized);
        assert_eq!(classify("hello world").kind(), LineKind::Unrecognized);
    }

    #[test]
    fn response_prefixes() {
        assert_eq!(Response::EndListDevices.prefix(), PREFIX_END_LIST_DEVICES);
        assert_eq!(
            Response::StopIr { addr: addr(1, 1) }.prefix(),
            PREFIX_STOP_IR
        );
    }

    #[test]
    fn lock_tokens() {
        assert_eq!(lock_token(true), "LOCKED");
        assert_eq!(parse_lock(lock_token(false)), Some(false));
    }
}
