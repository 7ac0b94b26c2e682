//! Channel configuration.

/// Default size of each read from the stream.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default limit for a frame that has not finished arriving.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for a channel's dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Bytes requested from the stream per read.
    pub read_buffer_size: usize,
    /// Buffered bytes allowed before an incomplete frame is rejected.
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
