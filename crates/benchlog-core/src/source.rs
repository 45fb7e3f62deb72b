use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The link answered with something the driver could not make sense of.
    /// The next read usually succeeds, so scanners retry without losing state.
    #[error("unexpected response: {0}")]
    Transient(String),
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("byte source closed")]
    Closed,
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Raw access to the device's UART.
///
/// `read` returns at most `max` bytes. An empty vector means nothing arrived
/// yet and is not an error. `timeout` of `None` lets the source use its own
/// polling interval.
pub trait ByteSource {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError>;
    fn read(&mut self, max: usize, timeout: Option<Duration>) -> Result<Vec<u8>, SourceError>;
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        (**self).write(bytes)
    }

    fn read(&mut self, max: usize, timeout: Option<Duration>) -> Result<Vec<u8>, SourceError> {
        (**self).read(max, timeout)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        (**self).write(bytes)
    }

    fn read(&mut self, max: usize, timeout: Option<Duration>) -> Result<Vec<u8>, SourceError> {
        (**self).read(max, timeout)
    }
}
