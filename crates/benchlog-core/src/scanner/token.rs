use super::frame::{FrameBuffer, Outcome};
use super::ScanError;
use crate::encoding::{StreamDecoder, TextEncoding};
use crate::sink::LogSink;
use crate::source::ByteSource;
use crate::stop::StopCondition;
use std::time::Duration;

pub const CHUNK_SIZE: usize = 32;
pub const CHUNK_TIMEOUT: Duration = Duration::from_secs(1);

/// Captures a test run until the device prints `[END]` or a complete
/// `[RESULT]xxxx`.
///
/// Every chunk is logged and flushed before it is searched, so a crash
/// mid-run still leaves the output on disk. Transient read errors are
/// retried with the frame and log intact; the prompt is not re-sent.
pub struct TokenFrameScanner {
    frame: FrameBuffer,
    decoder: StreamDecoder,
    chunk_size: usize,
    chunk_timeout: Duration,
}

impl TokenFrameScanner {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            frame: FrameBuffer::new(),
            decoder: encoding.stream_decoder(),
            chunk_size: CHUNK_SIZE,
            chunk_timeout: CHUNK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    #[must_use]
    pub fn chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn run<B, L, S>(
        &mut self,
        source: &mut B,
        sink: &mut L,
        prompt: &[u8],
        label: &str,
        stop: &mut S,
    ) -> Result<Outcome, ScanError>
    where
        B: ByteSource + ?Sized,
        L: LogSink + ?Sized,
        S: StopCondition + ?Sized,
    {
        source.write(prompt)?;
        log::info!("[{label}] prompt sent, capturing until [END] or [RESULT]");

        loop {
            if stop.should_stop() {
                if self.frame.is_empty() {
                    log::warn!("[{label}] stopped, the device sent nothing");
                } else {
                    log::warn!("[{label}] stopped after {} bytes without a terminal token", self.frame.len());
                }
                return Err(ScanError::Stopped);
            }

            let chunk = match source.read(self.chunk_size, Some(self.chunk_timeout)) {
                Ok(chunk) => chunk,
                Err(e) if e.is_transient() => {
                    log::warn!("[{label}] {e}, retrying read");
                    continue;
                }
                Err(e) => {
                    log::error!("[{label}] read failed: {e}");
                    return Err(e.into());
                }
            };
            if chunk.is_empty() {
                continue;
            }

            let text = self.decoder.decode(&chunk);
            if let Some(outcome) = self.accept(sink, &text, label)? {
                let tail = self.decoder.finish();
                if !tail.is_empty() {
                    self.accept(sink, &tail, label)?;
                }
                match &outcome {
                    Outcome::EndReached => log::info!("[{label}] [END] received, test complete"),
                    Outcome::ResultFound(payload) => log::info!("[{label}] result: {payload}"),
                }
                return Ok(outcome);
            }
        }
    }

    fn accept<L>(&mut self, sink: &mut L, text: &str, label: &str) -> Result<Option<Outcome>, ScanError>
    where
        L: LogSink + ?Sized,
    {
        // Only part of a multi-byte character arrived.
        if text.is_empty() {
            return Ok(None);
        }
        sink.append(text).map_err(ScanError::Sink)?;
        sink.flush().map_err(ScanError::Sink)?;

        let was_started = self.frame.started();
        self.frame.push(text);
        if !was_started && self.frame.started() {
            log::info!("[{label}] device reported [START]");
        }
        Ok(self.frame.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySource;
    use crate::scanner::RESULT_PAYLOAD_LEN;
    use crate::sink::MemorySink;
    use crate::source::SourceError;
    use crate::stop::{PollLimit, Unbounded};
    use proptest::prelude::*;

    fn scan(source: &mut ReplaySource) -> (Result<Outcome, ScanError>, TokenFrameScanner, MemorySink) {
        let mut sink = MemorySink::new();
        let mut scanner = TokenFrameScanner::new(TextEncoding::Utf8);
        let res = scanner.run(source, &mut sink, b"3\n", "ATP", &mut Unbounded);
        (res, scanner, sink)
    }

    fn source_of(chunks: &[&str]) -> ReplaySource {
        let mut source = ReplaySource::new();
        for chunk in chunks {
            source.push_data(chunk);
        }
        source
    }

    #[test]
    fn result_split_across_chunks() {
        let chunks = ["[STA", "RT]ru", "nning [RESU", "LT]9876 done"];
        let mut source = source_of(&chunks);
        let (res, scanner, sink) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::ResultFound("9876".into()));
        assert_eq!(sink.text(), chunks.concat());
        assert_eq!(scanner.frame().as_str(), chunks.concat());
        assert!(scanner.frame().started());
        assert_eq!(source.written(), b"3\n");
    }

    #[test]
    fn transient_error_between_chunks_loses_nothing() {
        let mut source = ReplaySource::new();
        source.push_data("abc").push_transient("Unexpected response").push_data("[END]");
        let (res, scanner, sink) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::EndReached);
        assert_eq!(sink.text(), "abc[END]");
        assert_eq!(scanner.frame().as_str(), "abc[END]");
        assert_eq!(source.written(), b"3\n", "prompt must not be re-sent");
    }

    #[test]
    fn end_in_same_chunk_beats_result() {
        let mut source = source_of(&["[RESULT]1234[END]"]);
        let (res, _, _) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::EndReached);
    }

    #[test]
    fn result_arriving_first_returns_before_a_later_end() {
        let mut source = source_of(&["[RESULT]1234", "[END]"]);
        let (res, _, _) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::ResultFound("1234".into()));
        assert!(!source.is_exhausted());
    }

    #[test]
    fn end_in_the_chunk_completing_the_payload_wins() {
        let mut source = source_of(&["[RESULT]12", "34[END]"]);
        let (res, _, _) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::EndReached);
    }

    #[test]
    fn end_right_after_a_short_payload_wins() {
        // "1[EN" would be a complete payload, but [END] is already there.
        let mut source = source_of(&["[RESULT]1", "[END]"]);
        let (res, scanner, _) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::EndReached);
        assert_eq!(scanner.frame().result_payload(), Some("1[EN"));
    }

    #[test]
    fn short_payload_keeps_reading() {
        let mut source = source_of(&["[RESULT]12", "", "3", "4tail"]);
        let (res, _, sink) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::ResultFound("1234".into()));
        assert_eq!(sink.text(), "[RESULT]1234tail");
    }

    #[test]
    fn short_payload_never_completed_runs_until_stopped() {
        let mut source = source_of(&["[RESULT]12"]);
        for _ in 0..50 {
            source.push_empty();
        }
        let mut sink = MemorySink::new();
        let mut scanner = TokenFrameScanner::new(TextEncoding::Utf8);
        let res = scanner.run(&mut source, &mut sink, b"", "BIT", &mut PollLimit::new(20));
        assert!(matches!(res, Err(ScanError::Stopped)));
        assert_eq!(source.reads(), 20);
        assert_eq!(scanner.frame().as_str(), "[RESULT]12");
    }

    #[test]
    fn silent_device_stops_with_an_empty_frame() {
        let mut source = ReplaySource::new();
        source.push_empty().push_empty().push_empty();
        let mut sink = MemorySink::new();
        let mut scanner = TokenFrameScanner::new(TextEncoding::Utf8);
        let res = scanner.run(&mut source, &mut sink, b"3\n", "ATP", &mut PollLimit::new(3));
        assert!(matches!(res, Err(ScanError::Stopped)));
        assert!(scanner.frame().is_empty());
        assert_eq!(sink.text(), "");
    }

    #[test]
    fn fatal_error_propagates_with_log_kept() {
        let mut source = ReplaySource::new();
        source.push_data("partial").push_fatal("device unplugged").push_data("[END]");
        let (res, _, sink) = scan(&mut source);
        assert!(matches!(res, Err(ScanError::Source(SourceError::Io(_)))));
        assert_eq!(sink.text(), "partial");
    }

    #[test]
    fn character_split_across_reads_is_logged_whole() {
        let mut source = ReplaySource::new();
        source.push_data(b"caf\xc3").push_data(b"\xa9 [END]");
        let (res, scanner, sink) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::EndReached);
        assert_eq!(sink.text(), "caf\u{e9} [END]");
        assert_eq!(scanner.frame().as_str(), sink.text());
    }

    #[test]
    fn dangling_partial_character_is_flushed_as_replacement() {
        let mut source = ReplaySource::new();
        source.push_data(b"[RESULT]9876\xe2\x82");
        let (res, scanner, sink) = scan(&mut source);
        assert_eq!(res.unwrap(), Outcome::ResultFound("9876".into()));
        assert_eq!(sink.text(), "[RESULT]9876\u{FFFD}");
        assert_eq!(scanner.frame().as_str(), sink.text());
        assert_eq!(sink.flushes(), 2);
    }

    #[test]
    fn every_chunk_is_flushed() {
        let mut source = source_of(&["a", "b", "[END]"]);
        let (_, _, sink) = scan(&mut source);
        assert_eq!(sink.flushes(), 3);
    }

    #[test]
    fn reads_use_configured_chunk_size() {
        let mut source = ReplaySource::chunked(b"0123456789[END]", 64);
        let mut sink = MemorySink::new();
        let mut scanner = TokenFrameScanner::new(TextEncoding::Utf8).chunk_size(4);
        let res = scanner.run(&mut source, &mut sink, b"", "ATP", &mut Unbounded);
        assert_eq!(res.unwrap(), Outcome::EndReached);
        assert_eq!(source.reads(), 4);
    }

    fn arb_chunks() -> impl Strategy<Value = (String, Vec<usize>)> {
        let body = "[a-z ]{0,40}";
        (body, "[0-9]{4}", body, 1usize..8).prop_flat_map(|(pre, payload, post, n)| {
            let text = format!("{pre}[RESULT]{payload}{post}");
            let len = text.len();
            (Just(text), proptest::collection::vec(0..=len, n))
        })
    }

    /// Text with `[END]` directly behind a `[RESULT]` payload of at most four
    /// digits, or with no `[RESULT]` at all, plus cut points.
    fn arb_end_race() -> impl Strategy<Value = (String, Vec<usize>)> {
        let body = "[a-z ]{0,20}";
        (body, proptest::option::of("[0-9]{0,4}"), body, 1usize..6).prop_flat_map(|(pre, digits, post, n)| {
            let text = match digits {
                Some(digits) => format!("{pre}[RESULT]{digits}[END]{post}"),
                None => format!("{pre}[END]{post}"),
            };
            let len = text.len();
            (Just(text), proptest::collection::vec(0..=len, n))
        })
    }

    proptest! {
        #[test]
        fn end_wins_unless_the_payload_completed_in_an_earlier_chunk((text, mut cuts) in arb_end_race()) {
            cuts.sort_unstable();
            cuts.push(text.len());
            let mut source = ReplaySource::new();
            let mut last = 0;
            for &cut in &cuts {
                source.push_data(&text.as_bytes()[last..cut]);
                last = cut;
            }

            let end_done = text.find("[END]").map(|at| at + "[END]".len()).unwrap_or(text.len());
            let expected = match text.find("[RESULT]") {
                None => Outcome::EndReached,
                Some(at) => {
                    let payload_at = at + "[RESULT]".len();
                    let payload_done = payload_at + RESULT_PAYLOAD_LEN;
                    // The first chunk to reach the fourth payload byte decides.
                    let decided = cuts.iter().copied().find(|&cut| cut >= payload_done).unwrap_or(text.len());
                    if decided >= end_done {
                        Outcome::EndReached
                    } else {
                        Outcome::ResultFound(text[payload_at..payload_done].to_string())
                    }
                }
            };

            let (res, _, _) = scan(&mut source);
            prop_assert_eq!(res.ok(), Some(expected));
        }

        #[test]
        fn payload_is_independent_of_chunking((text, mut cuts) in arb_chunks()) {
            cuts.sort_unstable();
            let mut source = ReplaySource::new();
            let mut last = 0;
            for cut in cuts.into_iter().chain([text.len()]) {
                source.push_data(&text.as_bytes()[last..cut]);
                last = cut;
            }
            let expected = text.split("[RESULT]").nth(1).map(|rest| rest[..4].to_string());

            let (res, scanner, sink) = scan(&mut source);
            prop_assert_eq!(res.ok(), expected.map(Outcome::ResultFound));
            prop_assert!(text.starts_with(sink.text()));
            prop_assert_eq!(scanner.frame().as_str(), sink.text());
        }

        #[test]
        fn transient_errors_do_not_change_the_capture(
            chunks in proptest::collection::vec("[a-z]{1,6}", 1..8),
            at in 0usize..8,
        ) {
            let mut clean = ReplaySource::new();
            let mut noisy = ReplaySource::new();
            for (i, chunk) in chunks.iter().enumerate() {
                if i == at {
                    noisy.push_transient("Unexpected response");
                }
                clean.push_data(chunk);
                noisy.push_data(chunk);
            }
            clean.push_data("[END]");
            noisy.push_data("[END]");

            let (a, sa, la) = scan(&mut clean);
            let (b, sb, lb) = scan(&mut noisy);
            prop_assert_eq!(a.unwrap(), Outcome::EndReached);
            prop_assert_eq!(b.unwrap(), Outcome::EndReached);
            prop_assert_eq!(sa.frame().as_str(), sb.frame().as_str());
            prop_assert_eq!(la.text(), lb.text());
        }
    }
}
