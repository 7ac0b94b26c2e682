//! Binding a service's operations into a routing table.
//!
//! A [`Service`] declares its callable operations by name through
//! [`Methods`]. Binding turns each operation into a [`Handler`] that
//! resolves the service instance, converts the positional arguments,
//! invokes the operation and encodes its return value. Failures at any of
//! these steps become a [`CallError`] instead of escaping the handler.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rpc_channel::handler::{bind, Methods, RoutingTable, Service, ServiceRegistry};
//! use serde_json::json;
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
//! let routes = Arc::new(RoutingTable::new());
//! let binding = bind::<Calculator>(&routes, Arc::new(ServiceRegistry::new())).unwrap();
//!
//! let add = routes.lookup("add").unwrap();
//! assert_eq!(add.call(vec![json!(2), json!(3)]).unwrap(), Some(json!(5)));
//!
//! binding.revoke();
//! assert!(routes.is_empty());
//! ```

use std::any::type_name;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::args::{encode_result, FromArgs};
use super::registry::{CallResult, Handler, RoutingTable};
use super::resolver::{resolve, ServiceResolver};
use crate::error::{CallError, Result};

/// A type whose operations can be bound to a channel.
pub trait Service: Send + Sync + 'static {
    /// Declare the operations callable over the channel.
    fn register(methods: &mut Methods<Self>)
    where
        Self: Sized;
}

/// Type-erased operation on a service instance.
type Operation<S> = Arc<dyn Fn(&S, Vec<Value>) -> CallResult + Send + Sync>;

/// Operations declared by a [`Service`].
pub struct Methods<S> {
    operations: Vec<(String, Operation<S>)>,
}

impl<S: Send + Sync + 'static> Methods<S> {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Declare an operation that always succeeds.
    ///
    /// Parameters are given as a tuple; return `()` for operations without a
    /// result.
    pub fn method<A, R, F>(&mut self, name: &str, operation: F) -> &mut Self
    where
        A: FromArgs + 'static,
        R: Serialize + 'static,
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        self.push(name, move |service, args| {
            let args = A::from_args(args)?;
            encode_result(&operation(service, args))
        })
    }

    /// Declare an operation that can fail.
    ///
    /// The error's `Display` output is sent to the caller.
    pub fn try_method<A, R, E, F>(&mut self, name: &str, operation: F) -> &mut Self
    where
        A: FromArgs + 'static,
        R: Serialize + 'static,
        E: Display + 'static,
        F: Fn(&S, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.push(name, move |service, args| {
            let args = A::from_args(args)?;
            match operation(service, args) {
                Ok(value) => encode_result(&value),
                Err(e) => Err(CallError::Invocation(e.to_string())),
            }
        })
    }

    fn push<F>(&mut self, name: &str, operation: F) -> &mut Self
    where
        F: Fn(&S, Vec<Value>) -> CallResult + Send + Sync + 'static,
    {
        self.operations.push((name.to_string(), Arc::new(operation)));
        self
    }

    /// Declared operation names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|(name, _)| name.as_str())
    }

    /// Number of declared operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if no operations are declared.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Revocation handle for a bound service.
///
/// [`revoke`](Binding::revoke) removes every method this binding installed
/// and frees the channel for another bind. Dropping the handle without
/// revoking leaves the methods routed.
#[must_use = "dropping a Binding keeps its methods routed; call revoke() to remove them"]
pub struct Binding {
    routes: Arc<RoutingTable>,
    id: u64,
    service: &'static str,
    methods: Vec<String>,
    revoked: AtomicBool,
}

impl Binding {
    /// Remove every method installed by this binding.
    ///
    /// Runs once; later or concurrent calls do nothing.
    pub fn revoke(&self) {
        if self.revoked.swap(true, Ordering::AcqRel) {
            return;
        }

        for method in &self.methods {
            self.routes.remove(method);
        }
        self.routes.release_binding(self.id);

        tracing::debug!(service = self.service, "service binding revoked");
    }

    /// Method names installed by this binding.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Type name of the bound service.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Whether [`revoke`](Binding::revoke) has run.
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("service", &self.service)
            .field("methods", &self.methods)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// Bind the operations of service `S` into `routes`.
///
/// # Errors
///
/// - `AlreadyBound` if another service is bound to the table
/// - `DuplicateMethod` if an operation name is declared twice or already
///   routed; nothing is installed in that case
pub fn bind<S>(routes: &Arc<RoutingTable>, resolver: Arc<dyn ServiceResolver>) -> Result<Binding>
where
    S: Service + Default,
{
    let mut declared = Methods::<S>::new();
    S::register(&mut declared);

    let service = type_name::<S>();
    let methods: Vec<String> = declared.names().map(str::to_string).collect();

    let entries = declared
        .operations
        .into_iter()
        .map(|(name, operation)| {
            let handler = service_handler(name.clone(), operation, Arc::clone(&resolver));
            (name, handler)
        })
        .collect();

    let id = routes.install_binding(service, entries)?;

    tracing::debug!(service, methods = methods.len(), "service bound");

    Ok(Binding {
        routes: Arc::clone(routes),
        id,
        service,
        methods,
        revoked: AtomicBool::new(false),
    })
}

/// Build the routed handler for one operation of `S`.
fn service_handler<S>(
    name: String,
    operation: Operation<S>,
    resolver: Arc<dyn ServiceResolver>,
) -> Arc<dyn Handler>
where
    S: Service + Default,
{
    Arc::new(move |args: Vec<Value>| -> CallResult {
        let instance = resolve::<S>(resolver.as_ref()).unwrap_or_else(|| Arc::new(S::default()));

        match catch_unwind(AssertUnwindSafe(|| operation(&*instance, args))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::warn!(method = %name, "operation panicked: {}", message);
                Err(CallError::Panicked(message))
            }
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}
