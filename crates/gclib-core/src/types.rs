//! Core value types used throughout gclib.
//!
//! These mirror the vocabulary of the Global Cache control API: connector
//! addresses, IR connector modes, serial port parameters, and the unit's
//! network configuration. All of them render to and parse from the exact
//! tokens used on the wire.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Physical port on the gateway, written `module:port` on the wire.
///
/// Both indices are 1-based per vendor convention. Module 0 is reserved for
/// the main unit itself (the network settings live at `0:1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorAddress {
    module: u8,
    port: u8,
}

impl ConnectorAddress {
    /// The main unit's own address, used by the network commands.
    pub const UNIT: ConnectorAddress = ConnectorAddress { module: 0, port: 1 };

    /// Create a connector address from module and port indices.
    pub const fn new(module: u8, port: u8) -> Self {
        ConnectorAddress { module, port }
    }

    /// Module index (slot on the gateway).
    pub fn module(&self) -> u8 {
        self.module
    }

    /// Port index within the module.
    pub fn port(&self) -> u8 {
        self.port
    }
}

impl fmt::Display for ConnectorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.port)
    }
}

/// Error returned when parsing a [`ConnectorAddress`] from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(pub String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid connector address: {:?}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for ConnectorAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAddressError(s.to_string());
        let (module, port) = s.trim().split_once(':').ok_or_else(err)?;
        let module = module.parse::<u8>().map_err(|_| err())?;
        let port = port.parse::<u8>().map_err(|_| err())?;
        if port == 0 {
            return Err(err());
        }
        Ok(ConnectorAddress { module, port })
    }
}

/// Mode of an IR connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrMode {
    /// IR output with carrier.
    Ir,
    /// Digital sensor input, polled with `getstate`.
    Sensor,
    /// Digital sensor input that also pushes `statechange` lines.
    SensorNotify,
    /// IR output without carrier modulation.
    IrNoCarrier,
}

impl IrMode {
    /// Wire token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            IrMode::Ir => "IR",
            IrMode::Sensor => "SENSOR",
            IrMode::SensorNotify => "SENSOR_NOTIFY",
            IrMode::IrNoCarrier => "IR_NOCARRIER",
        }
    }
}

impl fmt::Display for IrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IR" => Ok(IrMode::Ir),
            "SENSOR" => Ok(IrMode::Sensor),
            "SENSOR_NOTIFY" => Ok(IrMode::SensorNotify),
            "IR_NOCARRIER" => Ok(IrMode::IrNoCarrier),
            other => Err(format!("unknown IR mode: {other}")),
        }
    }
}

/// Baud rates accepted by the serial modules.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[1200, 2400, 4800, 9600, 19200, 38400, 57600];

/// Serial flow control setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// RTS/CTS hardware flow control.
    Hardware,
}

impl FlowControl {
    /// Wire token for this setting.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowControl::None => "FLOW_NONE",
            FlowControl::Hardware => "FLOW_HARDWARE",
        }
    }
}

impl FromStr for FlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FLOW_NONE" => Ok(FlowControl::None),
            "FLOW_HARDWARE" => Ok(FlowControl::Hardware),
            other => Err(format!("unknown flow control: {other}")),
        }
    }
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Wire token for this setting.
    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::None => "PARITY_NO",
            Parity::Odd => "PARITY_ODD",
            Parity::Even => "PARITY_EVEN",
        }
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARITY_NO" => Ok(Parity::None),
            "PARITY_ODD" => Ok(Parity::Odd),
            "PARITY_EVEN" => Ok(Parity::Even),
            other => Err(format!("unknown parity: {other}")),
        }
    }
}

/// Line parameters of a serial module port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub flow_control: FlowControl,
    pub parity: Parity,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: 9600,
            flow_control: FlowControl::None,
            parity: Parity::None,
        }
    }
}

/// How the unit obtains its IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Dhcp,
    Static,
}

impl AddressMode {
    /// Wire token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressMode::Dhcp => "DHCP",
            AddressMode::Static => "STATIC",
        }
    }
}

impl FromStr for AddressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DHCP" => Ok(AddressMode::Dhcp),
            "STATIC" => Ok(AddressMode::Static),
            other => Err(format!("unknown address mode: {other}")),
        }
    }
}

/// Network configuration of the gateway unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkConfig {
    /// Whether the configuration is locked against changes from the web UI.
    pub locked: bool,
    pub mode: AddressMode,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// One installed module, as reported by `getdevices`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Module index.
    pub module: u8,
    /// Module description, e.g. `"3 IR"` or `"1 SERIAL"`.
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display() {
        assert_eq!(ConnectorAddress::new(2, 1).to_string(), "2:1");
        assert_eq!(ConnectorAddress::UNIT.to_string(), "0:1");
    }

    #[test]
    fn address_parse() {
        let addr: ConnectorAddress = "4:3".parse().unwrap();
        assert_eq!(addr.module(), 4);
        assert_eq!(addr.port(), 3);
        assert_eq!(" 1:1 ".parse::<ConnectorAddress>().unwrap(), ConnectorAddress::new(1, 1));
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert!("".parse::<ConnectorAddress>().is_err());
        assert!("2".parse::<ConnectorAddress>().is_err());
        assert!("2:".parse::<ConnectorAddress>().is_err());
        assert!("a:1".parse::<ConnectorAddress>().is_err());
        assert!("2:0".parse::<ConnectorAddress>().is_err());
        assert!("2:1:3".parse::<ConnectorAddress>().is_err());
        assert!("300:1".parse::<ConnectorAddress>().is_err());
    }

    #[test]
    fn ir_mode_tokens() {
        for mode in [
            IrMode::Ir,
            IrMode::Sensor,
            IrMode::SensorNotify,
            IrMode::IrNoCarrier,
        ] {
            assert_eq!(mode.as_str().parse::<IrMode>().unwrap(), mode);
        }
        assert!("LED_LIGHTING".parse::<IrMode>().is_err());
    }

    #[test]
    fn serial_tokens() {
        assert_eq!("FLOW_HARDWARE".parse::<FlowControl>().unwrap(), FlowControl::Hardware);
        assert_eq!("PARITY_EVEN".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!(Parity::None.as_str(), "PARITY_NO");
        assert!("PARITY_MARK".parse::<Parity>().is_err());
    }

    #[test]
    fn serial_config_default() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, 9600);
        assert!(SUPPORTED_BAUD_RATES.contains(&cfg.baud_rate));
        assert_eq!(cfg.flow_control, FlowControl::None);
        assert_eq!(cfg.parity, Parity::None);
    }

    #[test]
    fn address_mode_tokens() {
        assert_eq!("DHCP".parse::<AddressMode>().unwrap(), AddressMode::Dhcp);
        assert_eq!(AddressMode::Static.as_str(), "STATIC");
        assert!("dhcp".parse::<AddressMode>().is_err());
    }
}
