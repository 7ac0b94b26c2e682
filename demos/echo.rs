//! Echo server - one channel per TCP connection.
//!
//! This example demonstrates:
//! - Starting a channel over a TCP stream with the builder
//! - Binding a service whose operations take typed arguments
//! - Supplying the service instance through a registry
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo
//! ```
//!
//! Then type JSON requests, e.g. with netcat:
//!
//! ```text
//! $ nc 127.0.0.1 7878
//! {"id":1,"method":"echo","args":["hello"]}
//! {"id":1,"result":"hello"}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rpc_channel::{Channel, Methods, Service, ServiceRegistry};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Shared across connections through the registry.
#[derive(Default)]
struct EchoService {
    calls: AtomicU64,
}

#[derive(Serialize)]
struct Stats {
    calls: u64,
}

impl Service for EchoService {
    fn register(methods: &mut Methods<Self>) {
        methods
            .method("Echo", |svc: &EchoService, (message,): (String,)| {
                svc.calls.fetch_add(1, Ordering::Relaxed);
                message
            })
            .method("Reverse", |svc: &EchoService, (message,): (String,)| {
                svc.calls.fetch_add(1, Ordering::Relaxed);
                message.chars().rev().collect::<String>()
            })
            .method("Stats", |svc: &EchoService, (): ()| Stats {
                calls: svc.calls.load(Ordering::Relaxed),
            });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let service = Arc::new(EchoService::default());
    let listener = TcpListener::bind("127.0.0.1:7878").await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = ServiceRegistry::new().shared(Arc::clone(&service));

        tokio::spawn(async move {
            let channel = Channel::builder(stream).resolver(registry).start();
            let binding = match channel.bind::<EchoService>() {
                Ok(binding) => binding,
                Err(e) => {
                    tracing::error!(%peer, "bind failed: {}", e);
                    return;
                }
            };

            let termination = channel.wait_for_termination().await;
            binding.revoke();
            tracing::info!(%peer, "connection ended: {:?}", termination);
        });
    }
}
