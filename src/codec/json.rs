//! JSON codec using `serde_json`.
//!
//! Frames are plain JSON values written back to back. On decode the
//! buffer is walked with a `StreamDeserializer`, which stops after the
//! first value and reports its end offset. Errors in the EOF category
//! mean the value is still arriving.
//!
//! [`JsonScanner`] tracks nesting depth and string state byte by byte, so
//! the full decode only runs once the closing bracket has arrived.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Codec, FrameScanner};
use crate::error::Result;

/// JSON codec for text frames.
pub struct JsonCodec;

impl Codec for JsonCodec {
    const NAME: &'static str = "json";

    type Scanner = JsonScanner;

    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode_prefix<T: DeserializeOwned>(buf: &[u8]) -> Result<Option<(T, usize)>> {
        let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<T>();

        match values.next() {
            Some(Ok(value)) => Ok(Some((value, values.byte_offset()))),
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e.into()),
            // Only whitespace so far
            None => Ok(None),
        }
    }

    fn is_blank(buf: &[u8]) -> bool {
        buf.iter().all(u8::is_ascii_whitespace)
    }
}

/// Finds the end of the first JSON value in a growing buffer.
#[derive(Debug, Default)]
pub struct JsonScanner {
    /// Next byte to look at.
    offset: usize,
    depth: usize,
    state: ScanState,
    end: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Between tokens.
    #[default]
    Structure,
    /// Inside a string.
    Text,
    /// After a backslash inside a string.
    Escape,
    /// Inside a top-level number or literal.
    Scalar,
}

impl FrameScanner for JsonScanner {
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        while self.end.is_none() {
            let byte = *buf.get(self.offset)?;
            self.step(byte);
        }
        self.end
    }
}

impl JsonScanner {
    fn step(&mut self, byte: u8) {
        let at = self.offset;
        self.offset += 1;

        match self.state {
            ScanState::Text => match byte {
                b'\\' => self.state = ScanState::Escape,
                b'"' => {
                    self.state = ScanState::Structure;
                    if self.depth == 0 {
                        self.end = Some(at + 1);
                    }
                }
                _ => {}
            },
            ScanState::Escape => self.state = ScanState::Text,
            ScanState::Scalar => {
                // A top-level scalar ends at the first byte that can't continue it
                if byte.is_ascii_whitespace() || b"{}[],:\"".contains(&byte) {
                    self.end = Some(at);
                }
            }
            ScanState::Structure => match byte {
                b'"' => self.state = ScanState::Text,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    // Unbalanced closers end the frame too; the decoder rejects them
                    if self.depth <= 1 {
                        self.end = Some(at + 1);
                    }
                    self.depth = self.depth.saturating_sub(1);
                }
                _ if byte.is_ascii_whitespace() => {}
                _ if self.depth == 0 => self.state = ScanState::Scalar,
                _ => {}
            },
        }
    }
}
