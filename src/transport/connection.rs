//! One client connection: framing, dispatch, response.
//!
//! ```text
//! Accepted -> Buffering -> Dispatched -> Buffering -> ... -> Closed
//! ```
//!
//! The read buffer lives inside the [`Framed`] codec state. Each step waits
//! until the codec has split off one complete frame, dispatches it and writes
//! exactly one response before reading again, so frames from one peer are
//! answered strictly in order.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, instrument, trace, warn};

use crate::core::codec::RequestCodec;
use crate::core::header::ResponseHeader;
use crate::core::response::Response;
use crate::error::{ErrorClass, Result, ServerError};
use crate::protocol::{Dispatched, Dispatcher, Disposition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket accepted, nothing read yet
    Accepted,
    /// Waiting for the rest of a frame
    Buffering,
    /// A complete frame is being handled
    Dispatched,
    Closed,
}

pub struct Connection<S> {
    framed: Framed<S, RequestCodec>,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        dispatcher: Dispatcher,
        codec: RequestCodec,
        read_buffer_capacity: usize,
    ) -> Self {
        Self {
            framed: Framed::with_capacity(stream, codec, read_buffer_capacity),
            peer,
            dispatcher,
            state: ConnectionState::Accepted,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve frames until the peer leaves or a response closes the connection.
    #[instrument(name = "connection", skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) {
        debug!("Connection accepted");
        while self.step().await != ConnectionState::Closed {}
        debug!("Connection closed");
    }

    /// Handle at most one frame and report the state reached afterwards.
    pub async fn step(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Closed {
            return ConnectionState::Closed;
        }

        self.transition(ConnectionState::Buffering);
        let next = match self.framed.next().await {
            None => {
                debug!("Peer disconnected");
                ConnectionState::Closed
            }
            Some(Err(err)) => {
                self.reject(err).await;
                ConnectionState::Closed
            }
            Some(Ok(frame)) => self.serve(frame).await,
        };
        self.transition(next);
        next
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "Connection state");
            self.state = next;
        }
    }

    async fn serve(&mut self, frame: Bytes) -> ConnectionState {
        let metrics = self.dispatcher.metrics().clone();
        metrics.frame_received(frame.len() as u64);
        self.transition(ConnectionState::Dispatched);

        let Dispatched {
            response,
            disposition,
        } = self.dispatcher.dispatch(&frame);

        match self.respond(response).await {
            Ok(Disposition::KeepOpen) if disposition == Disposition::KeepOpen => {
                ConnectionState::Buffering
            }
            Ok(_) => {
                debug!("Closing connection after ERROR");
                ConnectionState::Closed
            }
            Err(err) => {
                metrics.error(err.class());
                debug!(error = %err, "Failed to write response");
                ConnectionState::Closed
            }
        }
    }

    /// Write `response`, substituting ERROR when it cannot be encoded.
    ///
    /// A substituted ERROR closes the connection.
    async fn respond(&mut self, response: Response) -> Result<Disposition> {
        let metrics = self.dispatcher.metrics().clone();
        let len = (ResponseHeader::SIZE + response.payload_len()) as u64;
        let is_error = response.is_error();

        match self.framed.send(response).await {
            Ok(()) => {
                metrics.response_sent(len, is_error);
                Ok(Disposition::KeepOpen)
            }
            Err(ServerError::Protocol(err)) => {
                warn!(error = %err, "Response could not be encoded, sending ERROR");
                metrics.error(ErrorClass::Protocol);
                self.framed.send(Response::error()).await?;
                metrics.response_sent(ResponseHeader::SIZE as u64, true);
                Ok(Disposition::Close)
            }
            Err(err) => Err(err),
        }
    }

    /// Framing failed: answer ERROR unless the socket itself is gone.
    async fn reject(&mut self, err: ServerError) {
        let metrics = self.dispatcher.metrics().clone();
        let class = err.class();
        metrics.error(class);

        if class == ErrorClass::Transport {
            debug!(error = %err, "Connection I/O failed");
            return;
        }

        warn!(error = %err, "Closing connection after framing error");
        if self.framed.send(Response::error()).await.is_ok() {
            metrics.response_sent(ResponseHeader::SIZE as u64, true);
        }
    }
}
