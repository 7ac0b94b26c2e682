//! Routing table mapping method names to handlers.
//!
//! Names are matched case-insensitively, one character at a time: each
//! character is compared by its single-character uppercase form, and
//! characters without one (like `ß`) only match themselves. Multi-character
//! expansions and compatibility folds (KELVIN SIGN to `k`) are not applied.
//! The table is shared between the
//! dispatch loop and any task that binds or revokes services, so every
//! access goes through a single mutex. Lookups clone the handler `Arc`
//! and release the lock before the handler runs.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rpc_channel::handler::{CallResult, Handler, RoutingTable};
//! use serde_json::{json, Value};
//!
//! let routes = RoutingTable::new();
//! let ping: Arc<dyn Handler> = Arc::new(|_args: Vec<Value>| -> CallResult { Ok(Some(json!("pong"))) });
//! routes.install("Ping", ping).unwrap();
//!
//! let handler = routes.lookup("PING").unwrap();
//! assert_eq!(handler.call(vec![]).unwrap(), Some(json!("pong")));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::{CallError, ChannelError, Result};

/// Outcome of invoking a handler: an optional result value or a call error.
pub type CallResult = std::result::Result<Option<Value>, CallError>;

/// A routed unit of dispatch for one method name.
pub trait Handler: Send + Sync + 'static {
    /// Invoke with the request's positional arguments.
    fn call(&self, args: Vec<Value>) -> CallResult;
}

impl<F> Handler for F
where
    F: Fn(Vec<Value>) -> CallResult + Send + Sync + 'static,
{
    fn call(&self, args: Vec<Value>) -> CallResult {
        self(args)
    }
}

/// Entry for a routed method.
struct MethodEntry {
    /// Name as it was registered.
    name: String,
    handler: Arc<dyn Handler>,
}

/// The service currently bound, if any.
struct ActiveBinding {
    id: u64,
    service: &'static str,
}

struct Routes {
    /// Methods keyed by normalized name.
    methods: HashMap<String, MethodEntry>,
    bound: Option<ActiveBinding>,
    next_binding_id: u64,
}

/// Table mapping method names to handlers.
pub struct RoutingTable {
    inner: Mutex<Routes>,
}

/// Normalize a method name for case-insensitive matching.
fn method_key(name: &str) -> String {
    name.chars().map(simple_uppercase).collect()
}

/// Uppercase mapping of `c` when it is a single character, else `c`.
fn simple_uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

impl RoutingTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Routes {
                methods: HashMap::new(),
                bound: None,
                next_binding_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        // Handlers never run under this lock, so a poisoned table is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the handler routed under `method`.
    pub fn lookup(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.lock()
            .methods
            .get(&method_key(method))
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Route `method` to `handler`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMethod` if the name is already routed.
    pub fn install(&self, method: &str, handler: Arc<dyn Handler>) -> Result<()> {
        let mut routes = self.lock();
        let key = method_key(method);

        if routes.methods.contains_key(&key) {
            return Err(ChannelError::DuplicateMethod(method.to_string()));
        }

        routes.methods.insert(
            key,
            MethodEntry {
                name: method.to_string(),
                handler,
            },
        );
        Ok(())
    }

    /// Remove the route for `method`. Returns whether an entry was removed.
    pub fn remove(&self, method: &str) -> bool {
        self.lock().methods.remove(&method_key(method)).is_some()
    }

    /// Check whether `method` is routed.
    pub fn contains(&self, method: &str) -> bool {
        self.lock().methods.contains_key(&method_key(method))
    }

    /// Number of routed methods.
    pub fn len(&self) -> usize {
        self.lock().methods.len()
    }

    /// Check if no methods are routed.
    pub fn is_empty(&self) -> bool {
        self.lock().methods.is_empty()
    }

    /// Routed method names as registered, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .methods
            .values()
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Type name of the currently bound service.
    pub fn bound_service(&self) -> Option<&'static str> {
        self.lock().bound.as_ref().map(|b| b.service)
    }

    /// Install all handlers of a service binding in one step.
    ///
    /// Either every entry is installed and the service becomes the bound
    /// one, or nothing changes.
    pub(crate) fn install_binding(
        &self,
        service: &'static str,
        entries: Vec<(String, Arc<dyn Handler>)>,
    ) -> Result<u64> {
        let mut routes = self.lock();

        if let Some(active) = &routes.bound {
            return Err(ChannelError::AlreadyBound {
                bound: active.service,
            });
        }

        let mut keys = Vec::with_capacity(entries.len());
        for (name, _) in &entries {
            let key = method_key(name);
            if routes.methods.contains_key(&key) || keys.contains(&key) {
                return Err(ChannelError::DuplicateMethod(name.clone()));
            }
            keys.push(key);
        }

        for (key, (name, handler)) in keys.into_iter().zip(entries) {
            routes.methods.insert(key, MethodEntry { name, handler });
        }

        let id = routes.next_binding_id;
        routes.next_binding_id += 1;
        routes.bound = Some(ActiveBinding { id, service });
        Ok(id)
    }

    /// Free the bound slot if `id` still holds it.
    pub(crate) fn release_binding(&self, id: u64) {
        let mut routes = self.lock();
        if routes.bound.as_ref().is_some_and(|b| b.id == id) {
            routes.bound = None;
        }
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("methods", &self.methods())
            .field("bound", &self.bound_service())
            .finish()
    }
}
