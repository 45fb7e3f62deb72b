use std::fmt;

/// Number of characters the device prints right after `[RESULT]`.
pub const RESULT_PAYLOAD_LEN: usize = 4;

/// Markers the firmware embeds in its console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Start,
    Result,
    End,
}

impl Token {
    pub const ALL: [Token; 3] = [Token::Start, Token::Result, Token::End];

    pub const fn literal(self) -> &'static str {
        match self {
            Token::Start => "[START]",
            Token::Result => "[RESULT]",
            Token::End => "[END]",
        }
    }
}

// Longest literal; a token can straddle at most this many bytes minus one of
// already searched text.
const LONGEST_TOKEN: usize = Token::Result.literal().len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    EndReached,
    ResultFound(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::EndReached => f.write_str("end of test reached"),
            Outcome::ResultFound(payload) => write!(f, "result {payload}"),
        }
    }
}

/// Everything received during a token scan, plus where each token first
/// appeared.
///
/// Only grows. Each push searches the new text and the few bytes before it,
/// so tokens split across reads are found without rescanning the whole
/// buffer.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    text: String,
    searched: usize,
    found: [Option<usize>; 3],
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);

        let mut from = self.searched.saturating_sub(LONGEST_TOKEN - 1);
        while !self.text.is_char_boundary(from) {
            from -= 1;
        }
        let fresh = &self.text[from..];
        for (slot, token) in self.found.iter_mut().zip(Token::ALL) {
            if slot.is_none() {
                *slot = fresh.find(token.literal()).map(|at| from + at);
            }
        }
        self.searched = self.text.len();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset of the first occurrence of `token`.
    pub fn position(&self, token: Token) -> Option<usize> {
        self.found[token as usize]
    }

    pub fn contains(&self, token: Token) -> bool {
        self.position(token).is_some()
    }

    pub fn started(&self) -> bool {
        self.contains(Token::Start)
    }

    /// The characters after the first `[RESULT]`, once all of them arrived.
    pub fn result_payload(&self) -> Option<&str> {
        let at = self.position(Token::Result)? + Token::Result.literal().len();
        let rest = &self.text[at..];
        let (last, ch) = rest.char_indices().nth(RESULT_PAYLOAD_LEN - 1)?;
        Some(&rest[..last + ch.len_utf8()])
    }

    /// `[END]` wins over `[RESULT]` whenever both are present. A `[RESULT]`
    /// whose payload is still short counts as nothing yet.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.contains(Token::End) {
            return Some(Outcome::EndReached);
        }
        self.result_payload()
            .map(|payload| Outcome::ResultFound(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(chunks: &[&str]) -> FrameBuffer {
        let mut frame = FrameBuffer::new();
        for chunk in chunks {
            frame.push(chunk);
        }
        frame
    }

    #[test]
    fn finds_tokens_split_across_pushes() {
        let f = frame(&["[STA", "RT]ru", "nning [RESU", "LT]9876 done"]);
        assert_eq!(f.position(Token::Start), Some(0));
        assert_eq!(f.position(Token::Result), Some(15));
        assert_eq!(f.result_payload(), Some("9876"));
        assert_eq!(f.outcome(), Some(Outcome::ResultFound("9876".into())));
    }

    #[test]
    fn token_split_one_byte_at_a_time() {
        let mut f = FrameBuffer::new();
        for ch in "xx[RESULT]0042".chars() {
            f.push(&ch.to_string());
        }
        assert_eq!(f.result_payload(), Some("0042"));
    }

    #[test]
    fn short_payload_is_not_an_outcome() {
        let mut f = frame(&["[RESULT]98"]);
        assert!(f.contains(Token::Result));
        assert_eq!(f.outcome(), None);
        f.push("7");
        assert_eq!(f.outcome(), None);
        f.push("6");
        assert_eq!(f.outcome(), Some(Outcome::ResultFound("9876".into())));
    }

    #[test]
    fn end_wins_when_both_tokens_are_present() {
        assert_eq!(frame(&["[RESULT]1234[END]"]).outcome(), Some(Outcome::EndReached));
        assert_eq!(frame(&["[END][RESULT]1234"]).outcome(), Some(Outcome::EndReached));
    }

    #[test]
    fn payload_counts_characters_not_bytes() {
        let f = frame(&["[RESULT]é☃ab"]);
        assert_eq!(f.result_payload(), Some("é☃ab"));
    }

    #[test]
    fn first_result_token_is_used() {
        let f = frame(&["[RESULT]1111 [RESULT]2222"]);
        assert_eq!(f.result_payload(), Some("1111"));
    }

    #[test]
    fn search_window_respects_char_boundaries() {
        let f = frame(&["ééééé", "é[END]"]);
        assert_eq!(f.outcome(), Some(Outcome::EndReached));
    }

    #[test]
    fn start_alone_is_not_terminal() {
        let f = frame(&["[START]"]);
        assert!(f.started());
        assert_eq!(f.outcome(), None);
    }
}
