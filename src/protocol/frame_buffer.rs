//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Frames have no header,
//! so the buffer runs the codec's scanner over newly read bytes and only
//! decodes once the scanner has seen the end of a value. Each byte is
//! scanned once and each frame decoded once, however it was split.
//!
//! # Example
//!
//! ```
//! use rpc_channel::protocol::{FrameBuffer, Request};
//!
//! let mut buffer: FrameBuffer = FrameBuffer::new();
//!
//! buffer.push(br#"{"id": 1, "method": "Ping", "#);
//! assert!(buffer.next_frame::<Request>().unwrap().is_none());
//!
//! buffer.push(br#""args": []}"#);
//! let request = buffer.next_frame::<Request>().unwrap().unwrap();
//! assert_eq!(request.method, "Ping");
//! ```

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;

use crate::codec::{Codec, FrameScanner, JsonCodec};
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::{ChannelError, Result};

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer<C: Codec = JsonCodec> {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Boundary search state for the frame at the front.
    scanner: C::Scanner,
    /// Maximum bytes an incomplete frame may occupy.
    max_frame_size: usize,
}

impl<C: Codec> FrameBuffer<C> {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 16MB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanner: C::Scanner::default(),
            max_frame_size,
        }
    }

    /// Append data read from the stream.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(value))` if a complete frame was decoded and consumed
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the bytes are malformed or the pending frame is too large
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.scanner.scan(&self.buffer).is_none() {
            return self.incomplete();
        }

        match C::decode_prefix::<T>(&self.buffer)? {
            Some((value, consumed)) => {
                self.buffer.advance(consumed);
                self.scanner = C::Scanner::default();
                Ok(Some(value))
            }
            None => self.incomplete(),
        }
    }

    fn incomplete<T>(&self) -> Result<Option<T>> {
        if self.buffer.len() > self.max_frame_size {
            return Err(ChannelError::FrameTooLarge {
                size: self.buffer.len(),
                limit: self.max_frame_size,
            });
        }
        Ok(None)
    }

    /// Whether everything still buffered is padding between frames.
    pub fn is_blank(&self) -> bool {
        C::is_blank(&self.buffer)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanner = C::Scanner::default();
    }
}

impl<C: Codec> Default for FrameBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}
