//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//! Peers expect struct-as-map format, and `Request`/`Response` rely on
//! field names for their optional members.
//!
//! MessagePack values are self-delimiting, so a frame ends where the
//! deserializer stops reading. Decoding runs over a cursor and the
//! cursor position gives the frame length. A read that runs off the end
//! of the buffer means the frame is incomplete.
//!
//! [`MsgPackScanner`] walks marker headers and skips payloads by their
//! declared length, counting the values a container still owes.

use std::io::{Cursor, ErrorKind};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Codec, FrameScanner};
use crate::error::Result;

/// MessagePack codec for binary frames.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    type Scanner = MsgPackScanner;

    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode_prefix<T: DeserializeOwned>(buf: &[u8]) -> Result<Option<(T, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(buf);
        let decoded = {
            let mut de = rmp_serde::Deserializer::new(&mut cursor);
            T::deserialize(&mut de)
        };

        match decoded {
            Ok(value) => Ok(Some((value, cursor.position() as usize))),
            Err(e) if is_incomplete(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether the decoder ran out of bytes rather than hitting bad data.
fn is_incomplete(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;

    match err {
        Error::InvalidMarkerRead(io) | Error::InvalidDataRead(io) => {
            io.kind() == ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// Finds the end of the first MessagePack value in a growing buffer.
#[derive(Debug)]
pub struct MsgPackScanner {
    /// Start of the next unread value.
    offset: usize,
    /// Values still needed to finish the frame.
    pending: u64,
}

impl Default for MsgPackScanner {
    fn default() -> Self {
        Self {
            offset: 0,
            pending: 1,
        }
    }
}

impl FrameScanner for MsgPackScanner {
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pending > 0 {
            let rest = buf.get(self.offset..)?;
            match marker(rest)? {
                Marker::Invalid => return Some(self.offset + 1),
                Marker::Value { len, children } => {
                    if len > rest.len() as u64 {
                        return None;
                    }
                    self.offset += len as usize;
                    self.pending = (self.pending - 1).saturating_add(children);
                }
            }
        }
        Some(self.offset)
    }
}

enum Marker {
    /// Reserved marker byte.
    Invalid,
    /// `len` bytes of header and payload, followed by `children` nested values.
    Value { len: u64, children: u64 },
}

/// Read the header at the start of `buf`; `None` if it is cut off.
fn marker(buf: &[u8]) -> Option<Marker> {
    let byte = *buf.first()?;
    let field = |width: usize| buf.get(1..1 + width).map(read_be);

    let (len, children) = match byte {
        0x00..=0x7f | 0xe0..=0xff | 0xc0 | 0xc2 | 0xc3 => (1, 0),
        0x80..=0x8f => (1, 2 * u64::from(byte & 0x0f)),
        0x90..=0x9f => (1, u64::from(byte & 0x0f)),
        0xa0..=0xbf => (1 + u64::from(byte & 0x1f), 0),
        0xc1 => return Some(Marker::Invalid),
        // bin8/16/32, str8/16/32
        0xc4 | 0xd9 => (2 + field(1)?, 0),
        0xc5 | 0xda => (3 + field(2)?, 0),
        0xc6 | 0xdb => (5 + field(4)?, 0),
        // ext8/16/32 carry a type byte after the length
        0xc7 => (3 + field(1)?, 0),
        0xc8 => (4 + field(2)?, 0),
        0xc9 => (6 + field(4)?, 0),
        0xcc | 0xd0 => (2, 0),
        0xcd | 0xd1 => (3, 0),
        0xca | 0xce | 0xd2 => (5, 0),
        0xcb | 0xcf | 0xd3 => (9, 0),
        // fixext1/2/4/8/16
        0xd4 => (3, 0),
        0xd5 => (4, 0),
        0xd6 => (6, 0),
        0xd7 => (10, 0),
        0xd8 => (18, 0),
        0xdc => (3, field(2)?),
        0xdd => (5, field(4)?),
        0xde => (3, 2 * field(2)?),
        0xdf => (5, 2 * field(4)?),
    };

    Some(Marker::Value { len, children })
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}
