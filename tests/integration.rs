//! Integration tests for rpc-channel.
//!
//! These tests drive a running channel from the other end of an
//! in-memory duplex stream.

use std::sync::Arc;

use rpc_channel::protocol::FrameBuffer;
use rpc_channel::{
    Channel, ChannelError, Codec, JsonCodec, Methods, MsgPackCodec, Request, RequestId, Response,
    Service, ServiceRegistry, Termination,
};
use serde_json::json;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

#[derive(Default)]
struct Calculator;

impl Service for Calculator {
    fn register(methods: &mut Methods<Self>) {
        methods
            .method("Add", |_: &Calculator, (a, b): (i64, i64)| a + b)
            .method("Describe", |_: &Calculator, (n, s): (i64, String)| {
                format!("{}{}", n, s)
            })
            .method("Measure", |_: &Calculator, (s,): (String,)| s.len())
            .try_method("Divide", |_: &Calculator, (a, b): (i64, i64)| {
                if b == 0 {
                    Err("division by zero")
                } else {
                    Ok(a / b)
                }
            })
            .method("Explode", |_: &Calculator, (): ()| -> i64 {
                panic!("kaboom")
            });
    }
}

struct Greeter {
    greeting: String,
}

impl Default for Greeter {
    fn default() -> Self {
        Self {
            greeting: "Hello".to_string(),
        }
    }
}

impl Service for Greeter {
    fn register(methods: &mut Methods<Self>) {
        methods.method("Greet", |greeter: &Greeter, (name,): (String,)| {
            format!("{}, {}", greeter.greeting, name)
        });
    }
}

/// The calling side of a channel.
struct Peer<C: Codec = JsonCodec> {
    stream: DuplexStream,
    frames: FrameBuffer<C>,
}

impl<C: Codec> Peer<C> {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
        }
    }

    async fn send(&mut self, request: &Request) {
        let bytes = C::encode(request).unwrap();
        self.send_raw(&bytes).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn close(&mut self) {
        self.stream.shutdown().await.unwrap();
    }

    /// Next response, or `None` once the channel released its end.
    async fn recv(&mut self) -> Option<Response> {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(response) = self.frames.next_frame::<Response>().unwrap() {
                return Some(response);
            }

            let n = self.stream.read(&mut buf).await.unwrap();
            if n == 0 {
                assert!(self.frames.is_empty(), "stream ended mid-response");
                return None;
            }
            self.frames.push(&buf[..n]);
        }
    }

    async fn call(&mut self, request: Request) -> Response {
        self.send(&request).await;
        self.recv().await.expect("channel closed before responding")
    }
}

fn start_json() -> (Channel, Peer) {
    let (client, server) = duplex(64 * 1024);
    (Channel::builder(server).start(), Peer::new(client))
}

#[tokio::test]
async fn test_int_and_string_arguments() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let response = peer
        .call(Request::new(1, "Describe", vec![json!(3), json!("x")]))
        .await;

    assert_eq!(response.id, RequestId::Number(1));
    assert_eq!(response.result, Some(json!("3x")));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_method_names_are_case_insensitive() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let response = peer
        .call(Request::new("lower", "add", vec![json!(2), json!(5)]))
        .await;

    assert_eq!(response.id, RequestId::from("lower"));
    assert_eq!(response.result, Some(json!(7)));
}

#[tokio::test]
async fn test_unknown_method_keeps_serving() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let response = peer.call(Request::new(9, "Subtract", vec![])).await;
    assert_eq!(response.id, RequestId::Number(9));
    assert!(response.result.is_none());
    assert!(response.error.unwrap().contains("Subtract"));

    let response = peer.call(Request::new(10, "Add", vec![json!(1), json!(1)])).await;
    assert_eq!(response.result, Some(json!(2)));
}

#[tokio::test]
async fn test_call_failures_become_error_responses() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let divide = peer
        .call(Request::new(1, "Divide", vec![json!(1), json!(0)]))
        .await;
    assert_eq!(divide.error.as_deref(), Some("division by zero"));
    assert!(divide.result.is_none());

    let arity = peer.call(Request::new(2, "Add", vec![json!(1)])).await;
    assert!(arity.is_error());

    let conversion = peer
        .call(Request::new(3, "Add", vec![json!(1), json!("two")]))
        .await;
    assert!(conversion.is_error());

    let panicked = peer.call(Request::new(4, "Explode", vec![])).await;
    assert_eq!(panicked.error.as_deref(), Some("kaboom"));

    let ok = peer
        .call(Request::new(5, "Divide", vec![json!(9), json!(3)]))
        .await;
    assert_eq!(ok.result, Some(json!(3)));
}

#[tokio::test]
async fn test_responses_follow_request_order() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    // All requests in a single write
    let mut batch = Vec::new();
    for i in 0..5i64 {
        let method = if i == 2 { "Missing" } else { "Add" };
        batch.extend(JsonCodec::encode(&Request::new(i, method, vec![json!(i), json!(10)])).unwrap());
    }
    peer.send_raw(&batch).await;

    for i in 0..5i64 {
        let response = peer.recv().await.unwrap();
        assert_eq!(response.id, RequestId::Number(i));
        assert!(response.result.is_some() != response.error.is_some());
        if i == 2 {
            assert!(response.is_error());
        } else {
            assert_eq!(response.result, Some(json!(i + 10)));
        }
    }
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let bytes = JsonCodec::encode(&Request::new(1, "Add", vec![json!(20), json!(22)])).unwrap();
    let (head, tail) = bytes.split_at(bytes.len() / 2);

    peer.send_raw(head).await;
    tokio::task::yield_now().await;
    peer.send_raw(tail).await;

    let response = peer.recv().await.unwrap();
    assert_eq!(response.result, Some(json!(42)));
}

#[tokio::test]
async fn test_pascal_case_request() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    peer.send_raw(br#"{"Id":7,"Method":"Add","Args":[1,2]}"#).await;

    let response = peer.recv().await.unwrap();
    assert_eq!(response.id, RequestId::Number(7));
    assert_eq!(response.result, Some(json!(3)));
}

#[tokio::test]
async fn test_ids_outside_i64_are_echoed() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    peer.send_raw(br#"{"id":1.5,"method":"Add","args":[1,2]}"#).await;
    let response = peer.recv().await.unwrap();
    assert_eq!(response.id, RequestId::Float(1.5));
    assert_eq!(response.result, Some(json!(3)));

    peer.send_raw(br#"{"id":18446744073709551615,"method":"Nope","args":[]}"#)
        .await;
    let response = peer.recv().await.unwrap();
    assert_eq!(response.id, RequestId::Unsigned(u64::MAX));
    assert!(response.is_error());

    peer.send_raw(br#"{"id":null,"method":"Add","args":[2,2]}"#).await;
    let response = peer.recv().await.unwrap();
    assert_eq!(response.id, RequestId::Null);
    assert_eq!(response.result, Some(json!(4)));

    assert!(!channel.is_terminated());
}

#[tokio::test]
async fn test_large_request_in_small_writes() {
    let (client, server) = duplex(1024);
    let channel = Channel::builder(server).start();
    let _binding = channel.bind::<Calculator>().unwrap();
    let mut peer: Peer = Peer::new(client);

    let payload = "y".repeat(2 * 1024 * 1024);
    let bytes =
        JsonCodec::encode(&Request::new(1, "Measure", vec![json!(payload)])).unwrap();

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        for chunk in bytes.chunks(1024) {
            peer.send_raw(chunk).await;
        }
        peer.recv().await.unwrap()
    })
    .await
    .expect("large request took too long");

    assert_eq!(response.result, Some(json!(payload.len())));
}

#[tokio::test]
async fn test_resolver_supplies_instance() {
    let (client, server) = duplex(64 * 1024);
    let channel = Channel::builder(server)
        .resolver(ServiceRegistry::new().singleton(Greeter {
            greeting: "Hi".to_string(),
        }))
        .start();
    let _binding = channel.bind::<Greeter>().unwrap();
    let mut peer: Peer = Peer::new(client);

    let response = peer.call(Request::new(1, "Greet", vec![json!("Bob")])).await;
    assert_eq!(response.result, Some(json!("Hi, Bob")));
}

#[tokio::test]
async fn test_default_instance_without_registration() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Greeter>().unwrap();

    let response = peer.call(Request::new(1, "Greet", vec![json!("Ann")])).await;
    assert_eq!(response.result, Some(json!("Hello, Ann")));
}

#[tokio::test]
async fn test_msgpack_channel() {
    let (client, server) = duplex(64 * 1024);
    let channel = Channel::builder(server).codec::<MsgPackCodec>().start();
    let _binding = channel.bind::<Calculator>().unwrap();
    let mut peer: Peer<MsgPackCodec> = Peer::new(client);

    let response = peer
        .call(Request::new("m", "Describe", vec![json!(4), json!("y")]))
        .await;
    assert_eq!(response.id, RequestId::from("m"));
    assert_eq!(response.result, Some(json!("4y")));

    let response = peer.call(Request::new(2, "Nope", vec![])).await;
    assert!(response.is_error());
}

#[tokio::test]
async fn test_bind_and_revoke_on_running_channel() {
    let (channel, mut peer) = start_json();

    let before = peer.call(Request::new(1, "Add", vec![json!(1), json!(2)])).await;
    assert!(before.is_error());

    let binding = channel.bind::<Calculator>().unwrap();
    let bound = peer.call(Request::new(2, "Add", vec![json!(1), json!(2)])).await;
    assert_eq!(bound.result, Some(json!(3)));

    binding.revoke();
    let after = peer.call(Request::new(3, "Add", vec![json!(1), json!(2)])).await;
    assert!(after.error.unwrap().contains("Add"));

    // The slot is free again
    let _rebound = channel.bind::<Greeter>().unwrap();
}

#[tokio::test]
async fn test_second_service_rejected() {
    let (channel, _peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let err = channel.bind::<Greeter>().unwrap_err();
    assert!(matches!(err, ChannelError::AlreadyBound { .. }));
    assert!(!channel.routes().contains("Greet"));
}

#[tokio::test]
async fn test_clean_close() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    let response = peer.call(Request::new(1, "Add", vec![json!(1), json!(1)])).await;
    assert_eq!(response.result, Some(json!(2)));

    peer.close().await;

    let termination = channel.wait_for_termination().await;
    assert!(matches!(termination, Termination::Closed));
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_close_mid_frame_fails_without_response() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    peer.send_raw(br#"{"id":1,"method":"Add","ar"#).await;
    peer.close().await;

    let termination = channel.wait_for_termination().await;
    assert!(matches!(
        termination,
        Termination::Failed(ChannelError::TruncatedFrame(_))
    ));
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_malformed_frame_fails() {
    let (channel, mut peer) = start_json();

    peer.send_raw(b"{]").await;

    let termination = channel.wait_for_termination().await;
    let error = termination.error().unwrap();
    assert!(error.is_decode_failure());
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_oversized_frame_fails() {
    let (client, server) = duplex(64 * 1024);
    let channel = Channel::builder(server).max_frame_size(32).start();
    let mut peer: Peer = Peer::new(client);

    peer.send_raw(br#"{"id":1,"method":"Add","args":[1111111111111111"#)
        .await;

    let termination = channel.wait_for_termination().await;
    assert!(matches!(
        termination,
        Termination::Failed(ChannelError::FrameTooLarge { limit: 32, .. })
    ));
}

#[tokio::test]
async fn test_dispose_releases_stream() {
    let (channel, mut peer) = start_json();
    let _binding = channel.bind::<Calculator>().unwrap();

    // Loop is now blocked reading
    let response = peer.call(Request::new(1, "Add", vec![json!(1), json!(1)])).await;
    assert!(!response.is_error());

    channel.dispose();
    channel.dispose();

    let termination = channel.wait_for_termination().await;
    assert!(matches!(termination, Termination::Disposed));
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_drop_disposes() {
    let (channel, mut peer) = start_json();

    drop(channel);

    assert!(peer.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binding_changes_while_serving() {
    let (channel, mut peer) = start_json();
    let channel = Arc::new(channel);

    let binder = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            for _ in 0..200 {
                let binding = channel.bind::<Calculator>().unwrap();
                tokio::task::yield_now().await;
                binding.revoke();
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..200i64 {
        let response = peer.call(Request::new(i, "Add", vec![json!(i), json!(1)])).await;
        assert_eq!(response.id, RequestId::Number(i));

        match (response.result, response.error) {
            (Some(result), None) => assert_eq!(result, json!(i + 1)),
            (None, Some(error)) => assert!(error.contains("Unknown method")),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    binder.await.unwrap();
    assert!(channel.routes().is_empty());
}
