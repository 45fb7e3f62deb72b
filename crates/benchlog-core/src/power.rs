//! Power-delivery rails and I/O bank levels of the test fixture.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("channel {channel} rejected request: {reason}")]
    Rejected { channel: u8, reason: String },
}

/// Logic level of a GPIO bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankVoltage {
    V1P8,
    V2P5,
    V3P3,
    V5P0,
}

impl BankVoltage {
    pub fn millivolts(&self) -> u32 {
        match self {
            Self::V1P8 => 1800,
            Self::V2P5 => 2500,
            Self::V3P3 => 3300,
            Self::V5P0 => 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailSetting {
    pub channel: u8,
    pub voltage_mv: u32,
    pub current_limit_ma: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSetting {
    pub bank: u8,
    pub voltage: BankVoltage,
}

/// Whatever feeds the board under test.
pub trait PowerSupply {
    fn request_power(&mut self, channel: u8, voltage_mv: u32, current_limit_ma: u32) -> Result<(), PowerError>;
    fn set_bank_voltage(&mut self, bank: u8, voltage: BankVoltage) -> Result<(), PowerError>;
    fn enable_output(&mut self, channel: u8, on: bool) -> Result<(), PowerError>;
}

/// Bench supply driven by hand: every set-point is logged for the operator
/// and assumed applied.
#[derive(Debug, Default)]
pub struct ManualSupply {
    enabled: Vec<u8>,
}

impl ManualSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled_channels(&self) -> &[u8] {
        &self.enabled
    }
}

impl PowerSupply for ManualSupply {
    fn request_power(&mut self, channel: u8, voltage_mv: u32, current_limit_ma: u32) -> Result<(), PowerError> {
        log::info!(
            "CH{channel}: set {:.2} V, current limit {:.2} A",
            voltage_mv as f64 / 1000.0,
            current_limit_ma as f64 / 1000.0
        );
        Ok(())
    }

    fn set_bank_voltage(&mut self, bank: u8, voltage: BankVoltage) -> Result<(), PowerError> {
        log::info!("bank {bank}: set I/O level to {} mV", voltage.millivolts());
        Ok(())
    }

    fn enable_output(&mut self, channel: u8, on: bool) -> Result<(), PowerError> {
        self.enabled.retain(|&c| c != channel);
        if on {
            self.enabled.push(channel);
        }
        log::info!("CH{channel}: output {}", if on { "on" } else { "off" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_supply_tracks_enabled_outputs() {
        let mut psu = ManualSupply::new();
        psu.enable_output(1, true).unwrap();
        psu.enable_output(2, true).unwrap();
        psu.enable_output(1, true).unwrap();
        assert_eq!(psu.enabled_channels(), &[2, 1]);
        psu.enable_output(2, false).unwrap();
        assert_eq!(psu.enabled_channels(), &[1]);
    }

    #[test]
    fn bank_setting_round_trips_through_json() {
        let bank: BankSetting = serde_json::from_str(r#"{"bank":3,"voltage":"V5P0"}"#).unwrap();
        assert_eq!(bank, BankSetting { bank: 3, voltage: BankVoltage::V5P0 });
        assert_eq!(bank.voltage.millivolts(), 5000);
    }
}
