//! One fixture run: power the board, capture each test, power down.

use crate::encoding::TextEncoding;
use crate::power::{BankSetting, BankVoltage, PowerError, PowerSupply, RailSetting};
use crate::scanner::{Outcome, ScanError, TerminatorScanner, TokenFrameScanner, CHUNK_SIZE, CHUNK_TIMEOUT};
use crate::serial::LineEnding;
use crate::sink::{ConsoleSink, FileSink, Tee};
use crate::source::{ByteSource, SourceError};
use crate::stop::StopCondition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session plan: {0}")]
    Plan(String),
    #[error("cannot prepare log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Power(#[from] PowerError),
    #[error("cannot open UART: {0}")]
    Open(#[source] SourceError),
    #[error("{label} test failed: {source}")]
    Scan {
        label: String,
        #[source]
        source: ScanError,
    },
}

fn yes() -> bool {
    true
}

/// A test the firmware runs when sent `prompt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub label: String,
    pub prompt: String,
    pub log: PathBuf,
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Skip boot output up to the first `\r\n` before capturing.
    #[serde(default = "yes")]
    pub bypass: bool,
    /// Mirror the capture on stdout.
    #[serde(default = "yes")]
    pub echo: bool,
}

impl TestStep {
    pub fn new(label: &str, prompt: &str, log: impl Into<PathBuf>) -> Self {
        Self {
            label: label.to_string(),
            prompt: prompt.to_string(),
            log: log.into(),
            enabled: true,
            bypass: true,
            echo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPlan {
    pub rails: Vec<RailSetting>,
    pub banks: Vec<BankSetting>,
    pub settle_ms: u64,
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub chunk_size: usize,
    pub chunk_timeout_ms: u64,
    pub tests: Vec<TestStep>,
}

impl Default for SessionPlan {
    fn default() -> Self {
        let rail = |channel, voltage_mv, current_limit_ma| RailSetting {
            channel,
            voltage_mv,
            current_limit_ma,
        };
        let bank = |bank| BankSetting {
            bank,
            voltage: BankVoltage::V5P0,
        };
        Self {
            rails: vec![rail(1, 15_000, 2_500), rail(2, 5_000, 2_000)],
            banks: vec![bank(1), bank(2), bank(3)],
            settle_ms: 1000,
            encoding: TextEncoding::Utf8,
            line_ending: LineEnding::LF,
            chunk_size: CHUNK_SIZE,
            chunk_timeout_ms: CHUNK_TIMEOUT.as_millis() as u64,
            tests: vec![
                TestStep {
                    enabled: false,
                    ..TestStep::new("BIT", "1", "bit.txt")
                },
                TestStep::new("ATP", "3", "atp.txt"),
            ],
        }
    }
}

impl SessionPlan {
    /// Rejects plans that could never finish.
    ///
    /// The bypass phase watches raw bytes for `\r\n`, which an encoding
    /// that is not ASCII compatible never puts on the wire.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.chunk_size == 0 {
            return Err(SessionError::Plan("chunk_size must be at least 1".into()));
        }
        if !self.encoding.is_ascii_compatible() {
            if let Some(step) = self.tests.iter().find(|s| s.enabled && s.bypass) {
                return Err(SessionError::Plan(format!(
                    "{} test uses bypass, which needs an ASCII compatible encoding (got {:?})",
                    step.label, self.encoding
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub label: String,
    pub log: PathBuf,
    pub outcome: Outcome,
}

pub struct Session<'a> {
    plan: &'a SessionPlan,
}

impl<'a> Session<'a> {
    pub fn new(plan: &'a SessionPlan) -> Self {
        Self { plan }
    }

    /// Runs every enabled test in order.
    ///
    /// The plan is validated before anything is touched.
    /// All test logs are emptied first, including those of disabled tests.
    /// The source is opened only after the rails have settled. Outputs are
    /// switched off on every exit path; a failure to do so is logged and
    /// does not mask the original error.
    pub fn run<P, B, F, S>(&self, power: &mut P, open_source: F, stop: &mut S) -> Result<Vec<TestReport>, SessionError>
    where
        P: PowerSupply + ?Sized,
        B: ByteSource,
        F: FnOnce() -> Result<B, SourceError>,
        S: StopCondition + ?Sized,
    {
        self.plan.validate()?;

        for step in &self.plan.tests {
            FileSink::reset(&step.log).map_err(|source| SessionError::Log {
                path: step.log.clone(),
                source,
            })?;
        }

        let result = self.power_up(power).and_then(|()| {
            if self.plan.settle_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.plan.settle_ms));
            }
            let mut source = open_source().map_err(SessionError::Open)?;
            self.run_tests(&mut source, stop)
        });
        self.power_down(power);
        result
    }

    fn power_up<P: PowerSupply + ?Sized>(&self, power: &mut P) -> Result<(), SessionError> {
        for rail in &self.plan.rails {
            power.request_power(rail.channel, rail.voltage_mv, rail.current_limit_ma)?;
        }
        for bank in &self.plan.banks {
            power.set_bank_voltage(bank.bank, bank.voltage)?;
        }
        for rail in &self.plan.rails {
            power.enable_output(rail.channel, true)?;
        }
        Ok(())
    }

    fn power_down<P: PowerSupply + ?Sized>(&self, power: &mut P) {
        for rail in &self.plan.rails {
            if let Err(e) = power.enable_output(rail.channel, false) {
                log::warn!("failed to switch off CH{}: {e}", rail.channel);
            }
        }
    }

    fn run_tests<B, S>(&self, source: &mut B, stop: &mut S) -> Result<Vec<TestReport>, SessionError>
    where
        B: ByteSource + ?Sized,
        S: StopCondition + ?Sized,
    {
        let mut reports = Vec::new();
        for step in self.plan.tests.iter().filter(|s| s.enabled) {
            let outcome = self.run_step(step, source, stop).map_err(|source| SessionError::Scan {
                label: step.label.clone(),
                source,
            })?;
            reports.push(TestReport {
                label: step.label.clone(),
                log: step.log.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    fn run_step<B, S>(&self, step: &TestStep, source: &mut B, stop: &mut S) -> Result<Outcome, ScanError>
    where
        B: ByteSource + ?Sized,
        S: StopCondition + ?Sized,
    {
        let prompt = self.plan.line_ending.terminate(&step.prompt);

        if step.bypass {
            let mut log = open_log(&step.log)?;
            TerminatorScanner::new(self.plan.encoding).run(source, &mut log, &prompt, stop)?;
        }

        let mut log = open_log(&step.log)?;
        let mut scanner = TokenFrameScanner::new(self.plan.encoding)
            .chunk_size(self.plan.chunk_size)
            .chunk_timeout(Duration::from_millis(self.plan.chunk_timeout_ms));
        if step.echo {
            let mut tee = Tee::new(&mut log, ConsoleSink);
            scanner.run(source, &mut tee, &prompt, &step.label, stop)
        } else {
            scanner.run(source, &mut log, &prompt, &step.label, stop)
        }
    }
}

fn open_log(path: &Path) -> Result<FileSink, ScanError> {
    FileSink::append_to(path).map_err(ScanError::Sink)
}
