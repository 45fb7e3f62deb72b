//! Core functionalities: UART stream scanning, capture logs, fixture sessions.

pub mod encoding;
pub mod power;
pub mod replay;
pub mod scanner;
pub mod serial;
pub mod session;
pub mod sink;
pub mod source;
pub mod stop;

pub use encoding::{StreamDecoder, TextEncoding};
pub use power::{BankSetting, BankVoltage, ManualSupply, PowerError, PowerSupply, RailSetting};
pub use replay::ReplaySource;
pub use scanner::{FrameBuffer, Outcome, ScanError, TerminatorScanner, TokenFrameScanner, Token};
pub use serial::{list_ports, LineEnding, PortInfo, PortKind, SerialConfig, SerialPortSource};
pub use session::{Session, SessionError, SessionPlan, TestReport, TestStep};
pub use sink::{ConsoleSink, FileSink, LogSink, MemorySink, Tee};
pub use source::{ByteSource, SourceError};
pub use stop::{CancelToken, Clock, Deadline, PollLimit, StopCondition, SystemClock, Unbounded};
