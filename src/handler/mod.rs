//! Handler module - routing, service binding and argument marshalling.
//!
//! Provides:
//! - [`RoutingTable`] - maps method names to handlers (case-insensitive)
//! - [`Service`] / [`Methods`] - declare a type's callable operations
//! - [`bind`] / [`Binding`] - install a service's operations, revoke them as a unit
//! - [`ServiceResolver`] / [`ServiceRegistry`] - supply service instances
//!
//! # Example
//!
//! ```ignore
//! use rpc_channel::handler::{Methods, Service};
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl Service for Greeter {
//!     fn register(methods: &mut Methods<Self>) {
//!         methods
//!             .method("Hello", |_: &Greeter, (name,): (String,)| format!("Hello, {}", name))
//!             .method("Ping", |_: &Greeter, (): ()| "pong");
//!     }
//! }
//!
//! let binding = channel.bind::<Greeter>()?;
//! // ...
//! binding.revoke();
//! ```

mod args;
mod binder;
mod registry;
mod resolver;

pub use args::{encode_result, FromArgs};
pub use binder::{bind, Binding, Methods, Service};
pub use registry::{CallResult, Handler, RoutingTable};
pub use resolver::{resolve, AnyService, ServiceRegistry, ServiceResolver};
