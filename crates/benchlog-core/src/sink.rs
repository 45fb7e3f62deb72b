use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only text destination for captured device output.
pub trait LogSink {
    fn append(&mut self, text: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

impl<T: LogSink + ?Sized> LogSink for &mut T {
    fn append(&mut self, text: &str) -> io::Result<()> {
        (**self).append(text)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Log file opened in append mode. Buffered; flushed on drop.
pub struct FileSink {
    path: PathBuf,
    out: BufWriter<File>,
}

impl FileSink {
    pub fn append_to(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    /// Creates `path` or empties it if it already exists.
    pub fn reset(path: impl AsRef<Path>) -> io::Result<()> {
        File::create(path)?;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn append(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            log::warn!("failed to flush {}: {e}", self.path.display());
        }
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    text: String,
    flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl LogSink for MemorySink {
    fn append(&mut self, text: &str) -> io::Result<()> {
        self.text.push_str(text);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Echoes captured text to the terminal as it arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&mut self, text: &str) -> io::Result<()> {
        io::stdout().lock().write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// Writes to two sinks, primary first.
pub struct Tee<A, B> {
    pub primary: A,
    pub secondary: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: LogSink, B: LogSink> LogSink for Tee<A, B> {
    fn append(&mut self, text: &str) -> io::Result<()> {
        self.primary.append(text)?;
        self.secondary.append(text)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}
