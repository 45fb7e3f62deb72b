use anyhow::{bail, Context, Result};
use benchlog_core::{SerialConfig, SessionPlan};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub poll_timeout_ms: u64,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            port_name: if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" }.to_string(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            poll_timeout_ms: 50,
        }
    }
}

impl PortSettings {
    pub fn to_serial_config(&self) -> Result<SerialConfig> {
        let data_bits = match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            n => bail!("unsupported data_bits {n}, expected 5 to 8"),
        };
        let stop_bits = match self.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            n => bail!("unsupported stop_bits {n}, expected 1 or 2"),
        };
        let parity = match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let flow_control = match self.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        };
        Ok(SerialConfig {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            data_bits,
            parity,
            stop_bits,
            flow_control,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: PortSettings,
    pub session: SessionPlan,
    /// Abort the whole run after this many seconds.
    pub session_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Reads `path` if given, else the per-user config file if it exists,
    /// else falls back to the built-in bench setup.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => {
                    tracing::info!("no config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };
        let text = std::fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json(&text).with_context(|| format!("parse config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    /// Parses and validates; bad serial settings and unusable session
    /// plans are rejected here rather than at port open.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.port.to_serial_config()?;
        cfg.session.validate()?;
        Ok(cfg)
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("benchlog").join("config.json"))
}
