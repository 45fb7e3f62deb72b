use super::ScanError;
use crate::encoding::{StreamDecoder, TextEncoding};
use crate::sink::LogSink;
use crate::source::ByteSource;
use crate::stop::StopCondition;

pub const LINE_TERMINATOR: [u8; 2] = *b"\r\n";

/// The last two bytes seen on the wire, oldest first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorWindow {
    bytes: [u8; 2],
    len: usize,
}

impl TerminatorWindow {
    pub fn push(&mut self, byte: u8) {
        if self.len < 2 {
            self.bytes[self.len] = byte;
            self.len += 1;
        } else {
            self.bytes = [self.bytes[1], byte];
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_terminated(&self) -> bool {
        self.as_slice() == LINE_TERMINATOR
    }
}

/// Skips the boot chatter a freshly powered board prints before it accepts
/// commands.
///
/// Sends the prompt, then reads one byte at a time, logging each, until the
/// device emits `\r\n`. Empty reads are retried immediately. There is no
/// timeout of its own; pass a [`StopCondition`] to bound the wait.
///
/// The terminator is matched on raw bytes, so the encoding must be ASCII
/// compatible (see [`TextEncoding::is_ascii_compatible`]).
pub struct TerminatorScanner {
    window: TerminatorWindow,
    decoder: StreamDecoder,
}

impl TerminatorScanner {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            window: TerminatorWindow::default(),
            decoder: encoding.stream_decoder(),
        }
    }

    pub fn run<B, L, S>(
        &mut self,
        source: &mut B,
        sink: &mut L,
        prompt: &[u8],
        stop: &mut S,
    ) -> Result<(), ScanError>
    where
        B: ByteSource + ?Sized,
        L: LogSink + ?Sized,
        S: StopCondition + ?Sized,
    {
        source.write(prompt)?;
        log::info!("prompt sent, waiting for line terminator");

        loop {
            if stop.should_stop() {
                return Err(ScanError::Stopped);
            }

            let chunk = source.read(1, None)?;
            debug_assert!(chunk.len() <= 1, "source returned more than requested");
            for byte in chunk {
                let text = self.decoder.decode(&[byte]);
                if !text.is_empty() {
                    sink.append(&text).map_err(ScanError::Sink)?;
                }
                self.window.push(byte);
                if self.window.is_terminated() {
                    sink.flush().map_err(ScanError::Sink)?;
                    log::info!("line terminator received, boot output skipped");
                    return Ok(());
                }
            }
        }
    }
}
