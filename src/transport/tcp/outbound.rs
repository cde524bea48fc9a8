//! Calling side of the TCP transport.
//!
//! All calls of an outbound share one connection, dialed on first use and
//! redialed after it closes. Responses are matched to calls by request ID,
//! so calls complete in whatever order the peer answers them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::writer::{spawn_writer_task, WriterHandle};
use super::{TransportConfig, READ_BUFFER_SIZE};
use crate::envelope::{Framing, ResponseMessage};
use crate::error::{Result, RpcError};
use crate::options::ClientConfig;
use crate::protocol::{kind, Frame, FrameBuffer, RESERVED_REQUEST_ID};
use crate::transport::{Context, Outbound, Request, Response, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Started,
    Stopped,
}

/// TCP [`Outbound`].
///
/// The target can be changed with [`set_target`](TcpOutbound::set_target).
/// Calls already in flight when the target changes may complete against
/// either target; callers that care must not overlap the two.
#[derive(Debug)]
pub struct TcpOutbound {
    config: ClientConfig,
    framing: Framing,
    transport: TransportConfig,
    target: RwLock<Target>,
    state: Mutex<State>,
    connection: tokio::sync::Mutex<Option<Arc<Connection>>>,
}

impl TcpOutbound {
    pub fn new(target: Target, config: ClientConfig, transport: TransportConfig) -> Self {
        Self {
            framing: Framing::for_client(&config),
            config,
            transport,
            target: RwLock::new(target),
            state: Mutex::new(State::Idle),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn target(&self) -> Target {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point subsequent calls at `target`.
    pub fn set_target(&self, target: Target) {
        tracing::debug!(addr = %target.addr, path = %target.path, "outbound retargeted");
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = target;
    }

    pub fn is_running(&self) -> bool {
        self.state() == State::Started
    }

    fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live connection to `addr`, dialing one if needed.
    ///
    /// `stop` marks the outbound stopped before it takes the slot, so checking
    /// the state under the slot lock keeps a racing call from parking a fresh
    /// connection on a stopped outbound.
    async fn connection(&self, addr: &str) -> Result<Arc<Connection>> {
        let mut slot = self.connection.lock().await;
        if self.state() != State::Started {
            return Err(RpcError::NotReady("outbound"));
        }
        if let Some(connection) = slot.as_ref() {
            if connection.addr == addr && !connection.is_closed() {
                return Ok(Arc::clone(connection));
            }
        }

        let connection = Connection::dial(addr, &self.transport).await?;
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }
}

#[async_trait]
impl Outbound for TcpOutbound {
    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Idle => {
                *state = State::Started;
                tracing::debug!(addr = %self.target().addr, "outbound started");
                Ok(())
            }
            State::Started => Ok(()),
            State::Stopped => Err(RpcError::NotReady("stopped outbound")),
        }
    }

    async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == State::Stopped {
                return Ok(());
            }
            *state = State::Stopped;
        }

        if let Some(connection) = self.connection.lock().await.take() {
            connection.close();
        }
        tracing::debug!(addr = %self.target().addr, "outbound stopped");
        Ok(())
    }

    async fn call(&self, ctx: &Context, request: Request) -> Result<Response> {
        if self.state() != State::Started {
            return Err(RpcError::NotReady("outbound"));
        }

        let target = self.target();
        let service = request.service.clone();
        let procedure = request.procedure.clone();

        let mut message = self.framing.encode_request(request)?;
        message.meta.path = target.path;
        message.meta.ttl = ctx.remaining();

        ctx.run(async {
            let connection = self.connection(&target.addr).await?;
            let frame = message.into_frame(connection.next_id(), self.transport.max_payload_size)?;
            let frame = connection.round_trip(frame).await?;
            let response = ResponseMessage::from_frame(frame)?;
            self.framing.decode_response(&service, &procedure, response)
        })
        .await
    }
}

type Pending = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Frame>>>>>;

/// One dialed connection and the calls waiting on it.
#[derive(Debug)]
struct Connection {
    addr: String,
    writer: WriterHandle,
    pending: Pending,
    next_id: AtomicU32,
    closed: CancellationToken,
}

impl Connection {
    async fn dial(addr: &str, config: &TransportConfig) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RpcError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "could not disable Nagle");
        }
        let (reader, writer) = stream.into_split();
        let (writer, _writer_task) = spawn_writer_task(writer, config.writer.clone());

        let connection = Arc::new(Self {
            addr: addr.to_string(),
            writer,
            pending: Arc::default(),
            next_id: AtomicU32::new(1),
            closed: CancellationToken::new(),
        });
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&connection.pending),
            connection.closed.clone(),
            config.max_payload_size,
        ));

        tracing::debug!(%addr, "connected");
        Ok(connection)
    }

    fn next_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != RESERVED_REQUEST_ID {
                return id;
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.writer.is_closed()
    }

    fn close(&self) {
        self.closed.cancel();
    }

    /// Send `frame` and wait for the response with the same ID.
    ///
    /// Dropping the returned future abandons the call and tells the peer.
    async fn round_trip(&self, frame: Frame) -> Result<Frame> {
        let request_id = frame.request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, tx);
        let _guard = PendingCall {
            connection: self,
            request_id,
        };

        // The reader cancels `closed` before draining `pending`, so an entry
        // inserted after the drain is caught here.
        if self.closed.is_cancelled() {
            return Err(RpcError::ConnectionClosed);
        }

        self.writer.send(frame).await?;
        rx.await.map_err(|_| RpcError::ConnectionClosed)?
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Removes an abandoned call from the pending map and sends a cancel frame.
///
/// Answered calls were already removed by the reader, so dropping the guard
/// after a response is a no-op.
struct PendingCall<'a> {
    connection: &'a Connection,
    request_id: u32,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        let removed = self
            .connection
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
        if removed.is_some() && !self.connection.is_closed() {
            if let Err(e) = self.connection.writer.try_send(Frame::cancel(self.request_id)) {
                tracing::debug!(request_id = self.request_id, error = %e, "cancel not sent");
            }
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Pending,
    closed: CancellationToken,
    max_payload_size: u32,
) {
    let mut buffer = FrameBuffer::with_max_payload(max_payload_size);
    let mut chunk = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            _ = closed.cancelled() => break,
            read = reader.read(&mut chunk) => read,
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "read failed");
                break;
            }
        };

        let frames = match buffer.push(&chunk[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "closing connection on malformed frame");
                break;
            }
        };
        for frame in frames {
            let request_id = frame.request_id();
            if frame.header.kind != kind::RESPONSE {
                tracing::warn!(request_id, kind = frame.header.kind, "unexpected frame on outbound connection");
                continue;
            }
            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(Ok(frame));
                }
                None => tracing::debug!(request_id, "response for abandoned call"),
            }
        }
    }

    closed.cancel();
    let waiters: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(RpcError::ConnectionClosed));
    }
    tracing::debug!("connection closed");
}
