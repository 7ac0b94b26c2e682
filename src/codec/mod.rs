//! Codec module - serialization/deserialization of frames.
//!
//! Frames carry no length prefix. A codec must be able to tell where one
//! encoded value ends by parsing it, so decoding works on a growing buffer:
//! [`Codec::decode_prefix`] either yields the first complete value and the
//! number of bytes it occupied, or reports that more bytes are needed.
//!
//! - [`JsonCodec`] - UTF-8 JSON values, optionally separated by whitespace
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (to_vec_named)
//!
//! Each codec also has a [`FrameScanner`] that finds the end of a value
//! without decoding it. The scanner keeps its position between reads, so
//! a frame arriving in many small reads is walked once and decoded once.
//!
//! # Design
//!
//! Codecs are marker structs with static methods, selected at compile time
//! through the channel's type parameter.
//!
//! # Example
//!
//! ```
//! use rpc_channel::codec::{Codec, JsonCodec};
//!
//! let mut bytes = JsonCodec::encode(&"hello").unwrap();
//! bytes.extend_from_slice(br#"["next"#);
//!
//! let (first, used): (String, usize) = JsonCodec::decode_prefix(&bytes).unwrap().unwrap();
//! assert_eq!(first, "hello");
//!
//! // The rest is an incomplete value.
//! let rest: Option<(Vec<String>, usize)> = JsonCodec::decode_prefix(&bytes[used..]).unwrap();
//! assert!(rest.is_none());
//! ```

mod json;
mod msgpack;

pub use json::{JsonCodec, JsonScanner};
pub use msgpack::{MsgPackCodec, MsgPackScanner};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Self-delimiting wire encoding used for requests and responses.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in log output.
    const NAME: &'static str;

    /// Boundary scanner for this encoding.
    type Scanner: FrameScanner;

    /// Encode a value into one self-describing frame.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode the first complete value at the start of `buf`.
    ///
    /// Returns `Ok(None)` while `buf` holds only part of a value, and
    /// `Ok(Some((value, consumed)))` once a value is complete.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes can never form a valid `T`.
    fn decode_prefix<T: DeserializeOwned>(buf: &[u8]) -> Result<Option<(T, usize)>>;

    /// Whether leftover bytes are padding between frames rather than the
    /// start of a frame.
    fn is_blank(buf: &[u8]) -> bool {
        buf.is_empty()
    }
}

/// Incremental search for the end of the first value in a growing buffer.
///
/// A scanner only looks at structure. It never rejects input; malformed
/// bytes are reported as a boundary so the decoder can produce the error.
pub trait FrameScanner: Default + Send + 'static {
    /// Continue scanning `buf`.
    ///
    /// `buf` starts at the current frame and holds every byte seen so far;
    /// it only grows between calls. Returns the frame length once the
    /// first value is complete.
    fn scan(&mut self, buf: &[u8]) -> Option<usize>;
}
