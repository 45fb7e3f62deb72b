//! Readers that turn the device's UART stream into test milestones.
//!
//! Both scanners follow the same shape: send a prompt, then read and log
//! until a terminal condition shows up. [`TerminatorScanner`] waits for the
//! first `\r\n` after power-up; [`TokenFrameScanner`] waits for the `[END]`
//! or `[RESULT]` token of a test run.

mod frame;
mod terminator;
mod token;

pub use frame::{FrameBuffer, Outcome, Token, RESULT_PAYLOAD_LEN};
pub use terminator::{TerminatorScanner, TerminatorWindow, LINE_TERMINATOR};
pub use token::{TokenFrameScanner, CHUNK_SIZE, CHUNK_TIMEOUT};

use crate::source::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to write log: {0}")]
    Sink(#[source] std::io::Error),
    #[error("scan stopped before the device finished")]
    Stopped,
}
