use crate::source::{ByteSource, SourceError};
use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// What kind of link a listed port sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    Usb { vid: u16, pid: u16, product: Option<String> },
    Pci,
    Bluetooth,
    Unknown,
}

/// A port offered to the operator by `--list-ports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let kind = match info.port_type {
            SerialPortType::UsbPort(usb) => PortKind::Usb {
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product,
            },
            SerialPortType::PciPort => PortKind::Pci,
            SerialPortType::BluetoothPort => PortKind::Bluetooth,
            SerialPortType::Unknown => PortKind::Unknown,
        };
        Self {
            name: info.port_name,
            kind,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PortKind::Usb { vid, pid, product } => {
                write!(f, "{}  usb {vid:04x}:{pid:04x}", self.name)?;
                if let Some(product) = product {
                    write!(f, "  {product}")?;
                }
                Ok(())
            }
            PortKind::Pci => write!(f, "{}  pci", self.name),
            PortKind::Bluetooth => write!(f, "{}  bluetooth", self.name),
            PortKind::Unknown => f.write_str(&self.name),
        }
    }
}

pub fn list_ports() -> Result<Vec<PortInfo>, SourceError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect())
}

/// Line terminator appended to prompts sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    LF,
    CR,
    CRLF,
    None,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::LF => b"\n",
            LineEnding::CR => b"\r",
            LineEnding::CRLF => b"\r\n",
            LineEnding::None => b"",
        }
    }

    pub fn terminate(&self, text: &str) -> Vec<u8> {
        let mut data = text.as_bytes().to_vec();
        data.extend_from_slice(self.as_bytes());
        data
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
    /// How long a read without an explicit timeout waits before reporting
    /// an empty result.
    pub poll_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            data_bits: serialport::DataBits::Eight,
            parity: serialport::Parity::None,
            stop_bits: serialport::StopBits::One,
            flow_control: serialport::FlowControl::None,
            poll_timeout: Duration::from_millis(50),
        }
    }
}

/// [`ByteSource`] backed by a local serial port.
///
/// Read timeouts surface as empty reads. Interrupted reads and garbled
/// input are reported as [`SourceError::Transient`]; every other failure is
/// fatal.
pub struct SerialPortSource {
    port: Box<dyn SerialPort>,
    poll_timeout: Duration,
}

impl SerialPortSource {
    pub fn open(cfg: &SerialConfig) -> Result<Self, SourceError> {
        let port = serialport::new(&cfg.port_name, cfg.baud_rate)
            .data_bits(cfg.data_bits)
            .parity(cfg.parity)
            .stop_bits(cfg.stop_bits)
            .flow_control(cfg.flow_control)
            .timeout(cfg.poll_timeout)
            .open()?;
        log::info!("opened {} at {} baud", cfg.port_name, cfg.baud_rate);
        Ok(Self {
            port,
            poll_timeout: cfg.poll_timeout,
        })
    }
}

impl ByteSource for SerialPortSource {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, max: usize, timeout: Option<Duration>) -> Result<Vec<u8>, SourceError> {
        let timeout = timeout.unwrap_or(self.poll_timeout);
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout)?;
        }

        let mut buf = vec![0u8; max];
        match Read::read(&mut self.port, &mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => match classify(e) {
                Some(err) => Err(err),
                None => Ok(Vec::new()),
            },
        }
    }
}

/// `None` means the read timed out with nothing to report.
fn classify(e: std::io::Error) -> Option<SourceError> {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => None,
        ErrorKind::Interrupted | ErrorKind::InvalidData => Some(SourceError::Transient(e.to_string())),
        _ => Some(SourceError::Io(e)),
    }
}
