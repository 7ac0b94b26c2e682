//! Protocol module - message model and framing.
//!
//! This module implements the wire side of a channel:
//! - [`Request`] / [`Response`] messages and their [`RequestId`]
//! - [`FrameBuffer`] for extracting self-delimited frames from partial reads

mod frame_buffer;
mod message;

pub use frame_buffer::FrameBuffer;
pub use message::{Request, RequestId, Response};
