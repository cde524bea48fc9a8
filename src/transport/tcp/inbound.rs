//! Listening side of the TCP transport.
//!
//! ```text
//! accept loop ─► connection task ─► read loop ─► request task ─► handler task
//!                      │                              │
//!                      └──── writer task ◄────────────┘
//! ```
//!
//! Every task except the handler task is spawned on the run's
//! [`TaskTracker`], so `stop` can wait for them to drain.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::mux::Mux;
use super::writer::{spawn_writer_task, WriterHandle};
use super::{TransportConfig, READ_BUFFER_SIZE};
use crate::codec::default_codec;
use crate::envelope::{Framing, RequestMessage, ResponseMessage};
use crate::error::{ErrorKind, Result, RpcError};
use crate::handler::{Handler, Registry};
use crate::protocol::{kind, Frame, FrameBuffer, Status};
use crate::transport::{Context, Inbound, Request, Response};

const MUX_MISS: &str = "404 page not found";

type InFlight = Arc<Mutex<HashMap<u32, CancellationToken>>>;

type SharedRegistry = Arc<RwLock<Option<Arc<dyn Registry>>>>;

/// Handles for one start/stop cycle.
struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
}

/// What the tasks of one run share.
struct Server {
    registry: SharedRegistry,
    mux: Option<Arc<(String, Mux)>>,
    config: TransportConfig,
    limiter: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Stop accepting and reading.
    shutdown: CancellationToken,
    /// Cancel every in-flight handler.
    force: CancellationToken,
}

/// TCP [`Inbound`].
pub struct TcpInbound {
    address: String,
    config: TransportConfig,
    mux: Option<Arc<(String, Mux)>>,
    registry: SharedRegistry,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
    addr: RwLock<Option<SocketAddr>>,
}

impl TcpInbound {
    pub fn new(address: &str, config: TransportConfig) -> Self {
        Self {
            address: normalize_address(address),
            config,
            mux: None,
            registry: Arc::default(),
            lifecycle: tokio::sync::Mutex::new(None),
            addr: RwLock::new(None),
        }
    }

    /// Serve RPC only on `pattern` and route every other path to `mux`.
    pub fn with_mux(mut self, pattern: &str, mux: Mux) -> Self {
        self.mux = Some(Arc::new((pattern.to_string(), mux)));
        self
    }

    /// The configured listen address.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn set_addr(&self, addr: Option<SocketAddr>) {
        *self.addr.write().unwrap_or_else(PoisonError::into_inner) = addr;
    }
}

#[async_trait]
impl Inbound for TcpInbound {
    async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.as_ref() {
            return Err(RpcError::AlreadyStarted(running.addr));
        }

        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|source| RpcError::Bind {
                addr: self.address.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        let running = Running {
            addr,
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        let server = Arc::new(Server {
            registry: Arc::clone(&self.registry),
            mux: self.mux.clone(),
            config: self.config.clone(),
            limiter: Arc::new(Semaphore::new(self.config.max_concurrent_handlers)),
            tracker: running.tracker.clone(),
            shutdown: running.shutdown.clone(),
            force: running.force.clone(),
        });
        running.tracker.spawn(accept_loop(listener, server));

        self.set_addr(Some(addr));
        *lifecycle = Some(running);
        tracing::debug!(%addr, "inbound started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return Ok(());
        };

        running.shutdown.cancel();
        running.tracker.close();

        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, running.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(addr = %running.addr, ?grace, "cancelling requests still running after grace period");
            running.force.cancel();
            running.tracker.wait().await;
        }
        running.force.cancel();

        self.set_addr(None);
        tracing::debug!(addr = %running.addr, "inbound stopped");
        Ok(())
    }

    fn set_registry(&self, registry: Arc<dyn Registry>) {
        *self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(registry);
    }

    fn addr(&self) -> Option<SocketAddr> {
        *self.addr.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TcpInbound {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            running.shutdown.cancel();
            running.force.cancel();
        }
    }
}

/// `":port"` listens on every interface.
fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

async fn accept_loop(listener: TcpListener, server: Arc<Server>) {
    loop {
        let accepted = tokio::select! {
            _ = server.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                server
                    .tracker
                    .spawn(serve_connection(stream, peer, Arc::clone(&server)));
            }
            Err(e) => {
                // Per-connection failures (e.g. aborted handshakes) are not
                // fatal to the listener.
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, server: Arc<Server>) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "could not disable Nagle");
    }
    let (mut reader, writer) = stream.into_split();
    let (writer, writer_task) = spawn_writer_task(writer, server.config.writer.clone());

    let conn_token = server.force.child_token();
    let in_flight: InFlight = Arc::default();
    let mut buffer = FrameBuffer::with_max_payload(server.config.max_payload_size);
    let mut chunk = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            _ = server.shutdown.cancelled() => break,
            read = reader.read(&mut chunk) => read,
        };
        let n = match read {
            Ok(0) => {
                conn_token.cancel();
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "read failed");
                conn_token.cancel();
                break;
            }
        };

        let frames = match buffer.push(&chunk[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "closing connection on malformed frame");
                conn_token.cancel();
                break;
            }
        };
        for frame in frames {
            server.dispatch(frame, &writer, &conn_token, &in_flight);
        }
    }

    // Request tasks hold their own handles; the writer exits after the
    // last of them has sent its response.
    drop(writer);
    tokio::select! {
        _ = server.force.cancelled() => {}
        joined = writer_task => match joined {
            Ok(Err(e)) => tracing::debug!(%peer, error = %e, "writer failed"),
            Err(e) => tracing::error!(%peer, error = %e, "writer task panicked"),
            Ok(Ok(())) => {}
        },
    }
    tracing::debug!(%peer, "connection closed");
}

impl Server {
    fn dispatch(
        self: &Arc<Self>,
        frame: Frame,
        writer: &WriterHandle,
        conn_token: &CancellationToken,
        in_flight: &InFlight,
    ) {
        let request_id = frame.request_id();
        match frame.header.kind {
            kind::REQUEST => {}
            kind::CANCEL => {
                let token = in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&request_id);
                if let Some(token) = token {
                    tracing::debug!(request_id, "request cancelled by caller");
                    token.cancel();
                }
                return;
            }
            other => {
                tracing::warn!(request_id, kind = other, "unexpected frame on inbound connection");
                return;
            }
        }

        let Ok(permit) = Arc::clone(&self.limiter).try_acquire_owned() else {
            tracing::warn!(request_id, "handler capacity exhausted");
            let response = ResponseMessage::failure(Status::Unavailable, "inbound at capacity");
            self.send_now(writer, response, request_id);
            return;
        };

        let token = conn_token.child_token();
        in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, token.clone());

        let server = Arc::clone(self);
        let writer = writer.clone();
        let conn_token = conn_token.clone();
        let in_flight = Arc::clone(in_flight);
        self.tracker.spawn(async move {
            let _permit = permit;
            let response = server.serve(frame, token).await;
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request_id);

            // The connection is gone or being forced down; whatever the
            // handler produced after that is not an answer the caller asked for.
            if conn_token.is_cancelled() {
                tracing::debug!(request_id, "connection closed, dropping response");
                return;
            }

            match response.into_frame(request_id, server.config.max_payload_size) {
                Ok(frame) => {
                    if let Err(e) = writer.send(frame).await {
                        tracing::debug!(request_id, error = %e, "dropping response");
                    }
                }
                Err(e) => {
                    tracing::warn!(request_id, error = %e, "response could not be framed");
                    let response = ResponseMessage::failure(Status::Internal, e.to_string());
                    server.send_now(&writer, response, request_id);
                }
            }
        });
    }

    async fn serve(&self, frame: Frame, token: CancellationToken) -> ResponseMessage {
        let message = match RequestMessage::from_frame(frame) {
            Ok(message) => message,
            Err(e) => return ResponseMessage::from_error(&e),
        };
        let deadline = message.meta.ttl.map(|ttl| Instant::now() + ttl);
        let ctx = Context::from_parts(deadline, token);

        let result = match self.mux.as_deref() {
            Some((pattern, mux)) if message.meta.path != *pattern => {
                let Some(handler) = mux.route(&message.meta.path) else {
                    return ResponseMessage::failure(Status::NotFound, MUX_MISS);
                };
                let framing = Framing::new(
                    default_codec(),
                    message.is_enveloped(),
                    message.is_multiplexed(),
                );
                run_handler(framing, handler, ctx, message).await
            }
            _ => self.serve_rpc(ctx, message).await,
        };

        result.unwrap_or_else(|e| ResponseMessage::from_error(&e))
    }

    fn registry(&self) -> Result<Arc<dyn Registry>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RpcError::RoutingUnavailable)
    }

    async fn serve_rpc(&self, ctx: Context, message: RequestMessage) -> Result<ResponseMessage> {
        let registry = self.registry()?;
        let spec = registry.choose(&ctx, &message.meta).map_err(|e| {
            tracing::warn!(
                service = %message.meta.service,
                procedure = %message.meta.procedure,
                error = %e,
                "routing failed"
            );
            e
        })?;
        let framing = Framing::for_handler(&spec.config, message.is_multiplexed());
        run_handler(framing, spec.handler, ctx, message).await
    }

    /// Queue a failure response without waiting for writer capacity.
    fn send_now(&self, writer: &WriterHandle, response: ResponseMessage, request_id: u32) {
        let sent = response
            .into_frame(request_id, self.config.max_payload_size)
            .and_then(|frame| writer.try_send(frame));
        if let Err(e) = sent {
            tracing::debug!(request_id, error = %e, "dropping response");
        }
    }
}

async fn run_handler(
    framing: Framing,
    handler: Arc<dyn Handler>,
    ctx: Context,
    message: RequestMessage,
) -> Result<ResponseMessage> {
    let request = framing.decode_request(message)?;
    let service = request.service.clone();
    let procedure = request.procedure.clone();

    let response = invoke(handler, ctx, request).await.map_err(|e| {
        tracing::warn!(%service, %procedure, error = %e, "request failed");
        e
    })?;
    framing.encode_response(&service, &procedure, response)
}

/// Run `handler` in its own task, under `ctx`.
///
/// A panic fails the request with [`RpcError::Internal`]. Errors the handler
/// returns become application errors unless they carry a transport-level
/// classification.
async fn invoke(
    handler: Arc<dyn Handler>,
    ctx: Context,
    request: Request,
) -> Result<Response> {
    let handler_ctx = ctx.clone();
    let task = tokio::spawn(async move { handler.handle(handler_ctx, request).await });
    let abort = task.abort_handle();

    let joined = ctx
        .run(async move {
            task.await.map_err(|e| {
                if e.is_panic() {
                    tracing::error!("handler panicked");
                    RpcError::Internal("handler panicked".to_string())
                } else {
                    RpcError::Cancelled
                }
            })
        })
        .await;
    abort.abort();

    match joined? {
        Ok(response) => Ok(response),
        Err(e) if is_application(&e) => Ok(Response::application_error(e.to_string())),
        Err(e) => Err(e),
    }
}

fn is_application(err: &RpcError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Application | ErrorKind::Internal | ErrorKind::Network
    )
}
