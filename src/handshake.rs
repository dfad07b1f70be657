//! Accept-time admission for pending handshakes.
//!
//! Every accepted TCP connection takes one slot from a shared semaphore
//! before hyper reads a single byte. The slot is held until the connection
//! has produced a response (or, for WebSocket routes, until the upgrade
//! completes) and is bounded by a deadline: a client that has not got that
//! far when the deadline elapses has its socket dropped. Connections that
//! arrive while every slot is taken are answered with a bare `503` and
//! closed.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::serve::{IncomingStream, Listener};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Sleep;

use crate::error::GatewayError;

/// One pending-handshake slot, released at most once.
#[derive(Debug)]
pub struct HandshakeSlot {
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl HandshakeSlot {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            permit: Mutex::new(Some(permit)),
        }
    }

    /// Returns the slot to the pool. Only the first call returns `true`.
    pub fn release(&self) -> bool {
        self.permit
            .lock()
            .map(|mut permit| permit.take().is_some())
            .unwrap_or(false)
    }

    /// Returns `true` while the slot has not been released.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.permit
            .lock()
            .map(|permit| permit.is_some())
            .unwrap_or(false)
    }
}

/// TCP listener that admits a connection only when a handshake slot is
/// free.
#[derive(Debug)]
pub struct GuardedListener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    deadline: Duration,
}

impl GuardedListener {
    /// Wraps `inner`, drawing slots from `slots` and dropping connections
    /// that still hold theirs after `deadline`.
    #[must_use]
    pub const fn new(inner: TcpListener, slots: Arc<Semaphore>, deadline: Duration) -> Self {
        Self {
            inner,
            slots,
            deadline,
        }
    }
}

impl Listener for GuardedListener {
    type Io = GuardedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, remote_addr) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };
            match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => {
                    return (
                        GuardedStream::new(stream, HandshakeSlot::new(permit), self.deadline),
                        remote_addr,
                    );
                }
                Err(_) => {
                    tracing::warn!(remote_addr = %remote_addr, "handshake rejected: no free slot");
                    tokio::spawn(reject_busy(stream));
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Writes a `503` with the usual JSON error body and closes the socket.
async fn reject_busy(mut stream: TcpStream) {
    let error = GatewayError::TooManyHandshakes;
    let body = serde_json::to_string(&error.to_body()).unwrap_or_default();
    let status = error.status_code();
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
        body.len(),
    );
    let write = async {
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(Duration::from_secs(1), write).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, "busy response not delivered"),
        Err(_) => tracing::debug!("busy response timed out"),
    }
}

/// Accepted connection that fails its reads once the deadline passes while
/// its handshake slot is still held.
#[derive(Debug)]
pub struct GuardedStream {
    inner: TcpStream,
    slot: Arc<HandshakeSlot>,
    deadline: Pin<Box<Sleep>>,
    released: bool,
}

impl GuardedStream {
    fn new(inner: TcpStream, slot: HandshakeSlot, deadline: Duration) -> Self {
        Self {
            inner,
            slot: Arc::new(slot),
            deadline: Box::pin(tokio::time::sleep(deadline)),
            released: false,
        }
    }

    /// Returns the slot this connection holds.
    #[must_use]
    pub fn slot(&self) -> Arc<HandshakeSlot> {
        Arc::clone(&self.slot)
    }
}

impl AsyncRead for GuardedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.released {
            if this.slot.is_pending() {
                if this.deadline.as_mut().poll(cx).is_ready() {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "handshake deadline elapsed",
                    )));
                }
            } else {
                this.released = true;
            }
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for GuardedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Per-connection info handed to handlers through [`ConnectInfo`].
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Peer address of the TCP connection.
    pub remote_addr: SocketAddr,
    slot: Arc<HandshakeSlot>,
}

impl ClientConnection {
    /// Returns this connection's handshake slot to the pool.
    pub fn release_slot(&self) -> bool {
        self.slot.release()
    }
}

impl Connected<IncomingStream<'_, GuardedListener>> for ClientConnection {
    fn connect_info(stream: IncomingStream<'_, GuardedListener>) -> Self {
        Self {
            remote_addr: *stream.remote_addr(),
            slot: stream.io().slot(),
        }
    }
}

/// Releases the slot once a plain HTTP request has been answered. A
/// `101 Switching Protocols` keeps it until the WebSocket handler has
/// taken over the connection.
pub async fn release_after_response(request: Request, next: Next) -> Response {
    let connection = request
        .extensions()
        .get::<ConnectInfo<ClientConnection>>()
        .map(|info| info.0.clone());
    let response = next.run(request).await;
    if response.status() != StatusCode::SWITCHING_PROTOCOLS
        && let Some(connection) = connection
    {
        connection.release_slot();
    }
    response
}
