//! # rpc-channel
//!
//! Serve method calls over any duplex byte stream.
//!
//! A [`Channel`] reads framed requests (`{id, method, args}`) from the
//! stream, routes each one by method name to a bound service operation,
//! and writes back a framed response (`{id, result?, error?}`). Frames are
//! back-to-back values with no length prefix or separator; the codec
//! decides where one value ends.
//!
//! ## Architecture
//!
//! - **Codec**: JSON by default, MessagePack optional
//! - **Routing**: case-insensitive method table, shared between the
//!   dispatch loop and the caller binding services
//! - **Dispatch**: one request at a time, responses in request order
//!
//! ## Example
//!
//! ```ignore
//! use rpc_channel::{Channel, Methods, Service};
//!
//! #[derive(Default)]
//! struct Calculator;
//!
//! impl Service for Calculator {
//!     fn register(methods: &mut Methods<Self>) {
//!         methods.method("Add", |_: &Calculator, (a, b): (i64, i64)| a + b);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:7878").await?;
//!     let (stream, _) = listener.accept().await?;
//!
//!     let channel = Channel::builder(stream).start();
//!     let _binding = channel.bind::<Calculator>()?;
//!
//!     channel.wait_for_termination().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;

mod channel;

pub use channel::{Channel, ChannelBuilder, Termination};
pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use config::ChannelConfig;
pub use error::{CallError, ChannelError, Result};
pub use handler::{Binding, Methods, RoutingTable, Service, ServiceRegistry, ServiceResolver};
pub use protocol::{Request, RequestId, Response};
