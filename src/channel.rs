//! Channel builder and dispatch loop.
//!
//! The [`ChannelBuilder`] takes ownership of a duplex stream and collects
//! configuration. [`ChannelBuilder::start`] spawns the dispatch loop and
//! returns a [`Channel`] that manages the lifecycle:
//! 1. Read one framed request
//! 2. Route it by method name
//! 3. Invoke the handler inline, or produce an unknown-method error
//! 4. Write the framed response
//!
//! The loop repeats until the stream fails, the peer closes it, or the
//! channel is disposed. Requests are served one at a time, so responses
//! leave in the order requests arrived.
//!
//! # Example
//!
//! ```ignore
//! use rpc_channel::{Channel, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:7878").await?;
//!
//!     let channel = Channel::builder(stream)
//!         .resolver(ServiceRegistry::new().singleton(Greeter::default()))
//!         .start();
//!     let binding = channel.bind::<Greeter>()?;
//!
//!     let termination = channel.wait_for_termination().await;
//!     binding.revoke();
//!     println!("channel ended: {:?}", termination);
//!     Ok(())
//! }
//! ```

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{Codec, JsonCodec};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handler::{bind, Binding, RoutingTable, Service, ServiceRegistry, ServiceResolver};
use crate::protocol::{FrameBuffer, Request, Response};

/// How a dispatch loop ended.
///
/// A peer closing the stream cleanly, after its last complete request, is
/// reported as `Closed` rather than `Failed`. Callers that treat any end
/// of the stream as an error should match both. End of stream in the
/// middle of a frame is `Failed(ChannelError::TruncatedFrame)`.
#[derive(Debug)]
pub enum Termination {
    /// The channel was disposed.
    Disposed,
    /// The peer closed the stream between frames.
    ///
    /// Not a failure: [`is_failure`](Termination::is_failure) returns false.
    Closed,
    /// Reading, decoding or writing failed.
    Failed(ChannelError),
}

impl Termination {
    /// Whether the loop ended because of an error.
    ///
    /// False for [`Closed`](Termination::Closed) and
    /// [`Disposed`](Termination::Disposed).
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }

    /// The error that ended the loop, if any.
    pub fn error(&self) -> Option<&ChannelError> {
        match self {
            Termination::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Builder for configuring and starting a channel.
pub struct ChannelBuilder<S, C = JsonCodec> {
    stream: S,
    routes: Arc<RoutingTable>,
    resolver: Arc<dyn ServiceResolver>,
    config: ChannelConfig,
    _codec: PhantomData<fn() -> C>,
}

impl<S> ChannelBuilder<S, JsonCodec>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a builder for a JSON channel over `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            routes: Arc::new(RoutingTable::new()),
            resolver: Arc::new(ServiceRegistry::new()),
            config: ChannelConfig::default(),
            _codec: PhantomData,
        }
    }
}

impl<S, C> ChannelBuilder<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Codec,
{
    /// Use a different wire codec.
    pub fn codec<C2: Codec>(self) -> ChannelBuilder<S, C2> {
        ChannelBuilder {
            stream: self.stream,
            routes: self.routes,
            resolver: self.resolver,
            config: self.config,
            _codec: PhantomData,
        }
    }

    /// Set the resolver that supplies service instances.
    ///
    /// Bindings capture the resolver when they are made, so set it before
    /// binding.
    pub fn resolver<R: ServiceResolver>(self, resolver: R) -> Self {
        self.shared_resolver(Arc::new(resolver))
    }

    /// Set an already shared resolver.
    pub fn shared_resolver(mut self, resolver: Arc<dyn ServiceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of bytes requested per stream read.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the limit for a frame that has not finished arriving.
    ///
    /// Default: 16MB
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// The routing table the channel will dispatch through.
    pub fn routes(&self) -> &Arc<RoutingTable> {
        &self.routes
    }

    /// Bind service `T` before the loop starts.
    ///
    /// # Errors
    ///
    /// `AlreadyBound` or `DuplicateMethod`, see [`bind`].
    pub fn bind<T: Service + Default>(&self) -> Result<Binding> {
        bind::<T>(&self.routes, Arc::clone(&self.resolver))
    }

    /// Spawn the dispatch loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Channel {
        let (dispose_tx, dispose_rx) = oneshot::channel();
        let routes = Arc::clone(&self.routes);

        let task = tokio::spawn(run_loop::<S, C>(self.stream, routes, self.config, dispose_rx));

        Channel {
            routes: self.routes,
            resolver: self.resolver,
            dispose_tx: Mutex::new(Some(dispose_tx)),
            task,
        }
    }
}

/// A running channel.
///
/// Use `bind()` to route a service's operations, `dispose()` to stop the
/// loop and release the stream, and `wait_for_termination()` to learn how
/// the loop ended. Dropping the channel disposes it.
pub struct Channel {
    routes: Arc<RoutingTable>,
    resolver: Arc<dyn ServiceResolver>,
    /// Taken exactly once by `dispose()`.
    dispose_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: JoinHandle<Termination>,
}

impl Channel {
    /// Create a new channel builder.
    pub fn builder<S>(stream: S) -> ChannelBuilder<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        ChannelBuilder::new(stream)
    }

    /// Bind service `T` to this channel.
    ///
    /// Safe to call while the loop is serving requests.
    ///
    /// # Errors
    ///
    /// `AlreadyBound` or `DuplicateMethod`, see [`bind`].
    pub fn bind<T: Service + Default>(&self) -> Result<Binding> {
        bind::<T>(&self.routes, Arc::clone(&self.resolver))
    }

    /// The routing table this channel dispatches through.
    pub fn routes(&self) -> &Arc<RoutingTable> {
        &self.routes
    }

    /// Stop the loop and release the stream.
    ///
    /// A pending read or write is abandoned. Only the first call has an
    /// effect. Routed methods stay in the table and existing bindings can
    /// still be revoked.
    pub fn dispose(&self) {
        let sender = self
            .dispose_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(tx) = sender {
            // Loop may already be gone
            let _ = tx.send(());
        }
    }

    /// Whether the dispatch loop has ended.
    pub fn is_terminated(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the dispatch loop to end.
    ///
    /// This consumes the channel, so the outcome is observed once. The
    /// channel is not disposed by waiting.
    pub async fn wait_for_termination(self) -> Termination {
        let Channel {
            task, dispose_tx, ..
        } = self;
        // Keep the dispose signal alive while waiting
        let _dispose_tx = dispose_tx;

        match task.await {
            Ok(termination) => termination,
            Err(e) => Termination::Failed(ChannelError::Aborted(e.to_string())),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("routes", &self.routes)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Dispatch loop task: runs until termination, then reports it.
async fn run_loop<S, C>(
    stream: S,
    routes: Arc<RoutingTable>,
    config: ChannelConfig,
    dispose_rx: oneshot::Receiver<()>,
) -> Termination
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Codec,
{
    tracing::debug!(codec = C::NAME, "dispatch loop started");

    let termination = serve::<S, C>(stream, &routes, &config, dispose_rx).await;

    match &termination {
        Termination::Disposed => tracing::debug!("channel disposed"),
        Termination::Closed => tracing::info!("peer closed the stream"),
        Termination::Failed(e) => tracing::error!("Dispatch loop error: {}", e),
    }

    termination
}

/// Read, dispatch and answer requests until something ends the loop.
///
/// The stream is dropped on return.
async fn serve<S, C>(
    mut stream: S,
    routes: &RoutingTable,
    config: &ChannelConfig,
    mut dispose_rx: oneshot::Receiver<()>,
) -> Termination
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Codec,
{
    let mut frames = FrameBuffer::<C>::with_max_frame_size(config.max_frame_size);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    loop {
        let request = tokio::select! {
            biased;
            _ = &mut dispose_rx => return Termination::Disposed,
            read = read_request::<S, C>(&mut stream, &mut frames, &mut buf) => match read {
                Ok(Some(request)) => request,
                Ok(None) => return Termination::Closed,
                Err(e) => return Termination::Failed(e),
            },
        };

        let response = dispatch(routes, request);

        tokio::select! {
            biased;
            _ = &mut dispose_rx => return Termination::Disposed,
            written = write_response::<S, C>(&mut stream, &response) => {
                if let Err(e) = written {
                    return Termination::Failed(e);
                }
            }
        }
    }
}

/// Read until one complete request is buffered.
///
/// Returns `Ok(None)` when the stream ends cleanly between frames.
async fn read_request<S, C>(
    stream: &mut S,
    frames: &mut FrameBuffer<C>,
    buf: &mut [u8],
) -> Result<Option<Request>>
where
    S: AsyncRead + Unpin,
    C: Codec,
{
    loop {
        if let Some(request) = frames.next_frame::<Request>()? {
            return Ok(Some(request));
        }

        let n = stream.read(buf).await?;
        if n == 0 {
            if frames.is_blank() {
                return Ok(None);
            }
            return Err(ChannelError::TruncatedFrame(frames.len()));
        }

        frames.push(&buf[..n]);
    }
}

/// Route one request and produce its response.
pub(crate) fn dispatch(routes: &RoutingTable, request: Request) -> Response {
    let Some(handler) = routes.lookup(&request.method) else {
        tracing::warn!(id = %request.id, method = %request.method, "unknown method");
        return Response::unknown_method(&request);
    };

    tracing::debug!(id = %request.id, method = %request.method, "dispatching request");

    let Request { id, method, args } = request;
    let response = Response::from_outcome(id, handler.call(args));

    if let Some(error) = &response.error {
        tracing::warn!(id = %response.id, method = %method, "call failed: {}", error);
    }

    response
}

async fn write_response<S, C>(stream: &mut S, response: &Response) -> Result<()>
where
    S: AsyncWrite + Unpin,
    C: Codec,
{
    let bytes = C::encode(response)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}
