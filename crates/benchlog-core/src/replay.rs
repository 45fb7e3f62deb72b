//! Scripted byte source for dry runs and tests.

use crate::source::{ByteSource, SourceError};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Data(Vec<u8>),
    Empty,
    Transient(String),
    Fatal(String),
}

/// Plays back a fixed sequence of reads.
///
/// Each data step is served in slices of at most the requested size, so a
/// scanner reading one byte at a time drains a four-byte step in four reads.
/// Once the script runs out every read fails with [`SourceError::Closed`].
#[derive(Debug, Default)]
pub struct ReplaySource {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    reads: usize,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that yields `bytes` in reads of at most `chunk` bytes.
    pub fn chunked(bytes: &[u8], chunk: usize) -> Self {
        let mut source = Self::new();
        for piece in bytes.chunks(chunk.max(1)) {
            source.push_data(piece);
        }
        source
    }

    pub fn push_data(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.steps.push_back(Step::Data(bytes.as_ref().to_vec()));
        self
    }

    pub fn push_empty(&mut self) -> &mut Self {
        self.steps.push_back(Step::Empty);
        self
    }

    pub fn push_transient(&mut self, message: impl Into<String>) -> &mut Self {
        self.steps.push_back(Step::Transient(message.into()));
        self
    }

    pub fn push_fatal(&mut self, message: impl Into<String>) -> &mut Self {
        self.steps.push_back(Step::Fatal(message.into()));
        self
    }

    /// Everything the scanner sent to the device so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ByteSource for ReplaySource {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, max: usize, _timeout: Option<Duration>) -> Result<Vec<u8>, SourceError> {
        self.reads += 1;
        match self.steps.pop_front() {
            None => Err(SourceError::Closed),
            Some(Step::Empty) => Ok(Vec::new()),
            Some(Step::Transient(msg)) => Err(SourceError::Transient(msg)),
            Some(Step::Fatal(msg)) => Err(SourceError::Io(std::io::Error::other(msg))),
            Some(Step::Data(mut data)) => {
                if data.len() > max {
                    let rest = data.split_off(max);
                    self.steps.push_front(Step::Data(rest));
                }
                Ok(data)
            }
        }
    }
}
