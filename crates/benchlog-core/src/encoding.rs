use encoding_rs::{CoderResult, Decoder, Encoding, GBK, UTF_16LE, UTF_8};
use serde::{Deserialize, Serialize};

/// Character set the device under test prints in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16")]
    Utf16,
    #[serde(rename = "ASCII")]
    Ascii,
    #[serde(rename = "GBK", alias = "GB2312")]
    Gbk,
}

impl std::str::FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Self::Utf8,
            "UTF-16" | "UTF16" => Self::Utf16,
            "ASCII" => Self::Ascii,
            "GBK" | "GB2312" => Self::Gbk,
            _ => return Err(format!("unsupported encoding `{s}`")),
        })
    }
}

impl TextEncoding {
    fn codec(&self) -> Option<&'static Encoding> {
        match self {
            Self::Utf8 => Some(UTF_8),
            Self::Utf16 => Some(UTF_16LE),
            Self::Gbk => Some(GBK),
            Self::Ascii => None,
        }
    }

    /// Whether ASCII text, and so the raw `\r\n` terminator, reaches the
    /// wire byte for byte.
    pub fn is_ascii_compatible(&self) -> bool {
        self.codec().map_or(true, |codec| codec.is_ascii_compatible())
    }

    pub fn stream_decoder(&self) -> StreamDecoder {
        StreamDecoder::new(*self)
    }
}

/// Lossy incremental decoder for a chunked byte stream.
///
/// Malformed input never fails: it comes out as U+FFFD (or `?` for ASCII).
/// A multi-byte character split across two reads is held back until its
/// tail arrives, so feeding a stream one byte at a time yields the same text
/// as feeding it in one piece.
pub struct StreamDecoder {
    inner: Inner,
}

enum Inner {
    Ascii,
    Codec(Decoder),
}

impl StreamDecoder {
    pub fn new(encoding: TextEncoding) -> Self {
        let inner = match encoding.codec() {
            Some(codec) => Inner::Codec(codec.new_decoder_without_bom_handling()),
            None => Inner::Ascii,
        };
        Self { inner }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.run(bytes, false)
    }

    /// Flushes a dangling partial sequence, if any, and starts over.
    pub fn finish(&mut self) -> String {
        let tail = self.run(&[], true);
        if let Inner::Codec(decoder) = &mut self.inner {
            *decoder = decoder.encoding().new_decoder_without_bom_handling();
        }
        tail
    }

    fn run(&mut self, bytes: &[u8], last: bool) -> String {
        let decoder = match &mut self.inner {
            Inner::Ascii => {
                return bytes.iter().map(|&b| if b < 128 { b as char } else { '?' }).collect();
            }
            Inner::Codec(decoder) => decoder,
        };

        let mut out = String::new();
        let mut rest = bytes;
        loop {
            let needed = decoder
                .max_utf8_buffer_length(rest.len())
                .unwrap_or(rest.len() * 3 + 16);
            out.reserve(needed);
            let (result, read, _) = decoder.decode_to_string(rest, &mut out, last);
            rest = &rest[read..];
            if matches!(result, CoderResult::InputEmpty) {
                return out;
            }
        }
    }
}
