//! Per-connection session: register, relay every received frame to all
//! registered peers, then tear down without disturbing a newer connection
//! for the same identity.

use std::sync::Arc;
use std::time::Duration;

use futures::{future::join_all, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::websocket::connection::{BoxedSink, Connection, ConnectionId, Identity};
use crate::websocket::connection_registry::{ConnectionRegistry, Removal};
use crate::websocket::frame::{CloseReason, Frame, Inbound};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// The broadcast core: the shared registry plus the per-peer send bound.
#[derive(Clone)]
pub struct Hub {
    registry: ConnectionRegistry,
    send_timeout: Duration,
}

/// Why a session's receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The peer sent a close frame.
    PeerClosed(Option<CloseReason>),
    /// Receiving from the peer failed.
    ReceiveFailed(String),
    /// The stream ended without a close frame.
    StreamEnded,
}

impl Termination {
    /// Code and reason for our side of the close handshake.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Termination::PeerClosed(Some(reason)) => reason.clone(),
            Termination::PeerClosed(None) => CloseReason::normal(),
            Termination::ReceiveFailed(_) | Termination::StreamEnded => {
                CloseReason::receive_failed()
            }
        }
    }
}

/// How the registry entry was handled at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Removed,
    /// A newer connection owns the identity and was left registered.
    Superseded(ConnectionId),
    AlreadyAbsent,
}

/// Result of relaying one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Open peers a send was attempted to.
    pub attempted: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub frames_relayed: u64,
    pub termination: Termination,
    pub teardown: Teardown,
    /// Whether this session sent the close frame itself. `false` when the
    /// connection was already closed (e.g. at shutdown) or the send failed.
    pub closed: bool,
}

impl Hub {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            send_timeout,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle one accepted connection until it closes.
    ///
    /// `inbound` is the connection's receive half. It is consumed here, so no
    /// other task can ever receive from the same connection.
    pub async fn serve<R>(
        &self,
        identity: Identity,
        sink: BoxedSink,
        mut inbound: R,
    ) -> SessionReport
    where
        R: Stream<Item = Result<Inbound>> + Unpin,
    {
        let connection = Arc::new(Connection::new(identity.clone(), sink));
        self.registry
            .upsert(identity.clone(), connection.clone())
            .await;
        tracing::info!(
            identity = %identity,
            connection_id = %connection.id(),
            "Session started"
        );

        let mut frames_relayed = 0;
        let termination = loop {
            match inbound.next().await {
                Some(Ok(Inbound::Frame(frame))) => {
                    tracing::debug!(
                        identity = %identity,
                        connection_id = %connection.id(),
                        kind = ?frame.kind,
                        fin = frame.fin,
                        message_length = frame.payload.len(),
                        "Received frame"
                    );
                    self.broadcast(&frame).await;
                    frames_relayed += 1;
                }
                Some(Ok(Inbound::Control)) => {}
                Some(Ok(Inbound::Close(reason))) => {
                    tracing::info!(
                        identity = %identity,
                        connection_id = %connection.id(),
                        reason = ?reason,
                        "Peer closed connection"
                    );
                    break Termination::PeerClosed(reason);
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        identity = %identity,
                        connection_id = %connection.id(),
                        error = %e,
                        "Receive failed"
                    );
                    break Termination::ReceiveFailed(e.to_string());
                }
                None => break Termination::StreamEnded,
            }
        };

        connection.mark_closing();
        let teardown = self.deregister(&identity, &connection).await;
        let closed = self
            .close_connection(&connection, termination.close_reason())
            .await;

        tracing::info!(
            identity = %identity,
            connection_id = %connection.id(),
            frames_relayed,
            teardown = ?teardown,
            "Session ended"
        );
        SessionReport {
            identity,
            connection_id: connection.id(),
            frames_relayed,
            termination,
            teardown,
            closed,
        }
    }

    /// Relay `frame` unchanged to every open connection in the registry,
    /// including the one it came from.
    ///
    /// Peers are sent to concurrently and each send is bounded by the send
    /// timeout; a failing peer is logged and skipped.
    pub async fn broadcast(&self, frame: &Frame) -> FanOut {
        let peers = self.registry.snapshot().await;
        let sends = peers
            .iter()
            .filter(|peer| peer.is_open())
            .map(|peer| self.send_to(peer, frame.clone()));
        let results = join_all(sends).await;
        FanOut {
            attempted: results.len(),
            delivered: results.into_iter().filter(|ok| *ok).count(),
        }
    }

    async fn send_to(&self, peer: &Arc<Connection>, frame: Frame) -> bool {
        let result = match tokio::time::timeout(self.send_timeout, peer.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SendTimeout(self.send_timeout)),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    identity = %peer.identity(),
                    connection_id = %peer.id(),
                    error = %e,
                    "Failed to relay frame to peer"
                );
                false
            }
        }
    }

    /// Start the close handshake on every registered connection, concurrently
    /// and each bounded by the send timeout. Returns how many close frames
    /// were sent.
    ///
    /// Entries stay in place; each session removes its own when its receive
    /// loop observes the close.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let connections = self.registry.snapshot().await;
        let closes = connections
            .iter()
            .map(|connection| self.close_connection(connection, reason.clone()));
        join_all(closes).await.into_iter().filter(|sent| *sent).count()
    }

    async fn close_connection(&self, connection: &Arc<Connection>, reason: CloseReason) -> bool {
        let result = match tokio::time::timeout(self.send_timeout, connection.close(reason)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SendTimeout(self.send_timeout)),
        };
        match result {
            Ok(sent) => sent,
            Err(e) => {
                tracing::debug!(
                    identity = %connection.identity(),
                    connection_id = %connection.id(),
                    error = %e,
                    "Close handshake failed"
                );
                false
            }
        }
    }

    async fn deregister(&self, identity: &Identity, connection: &Arc<Connection>) -> Teardown {
        match self.registry.conditional_remove(identity, connection).await {
            Removal::Removed => Teardown::Removed,
            Removal::DoesNotMatch(newer) => {
                // The identity reconnected while this session was running.
                self.registry.reinstate(identity, &newer).await;
                Teardown::Superseded(newer.id())
            }
            Removal::AlreadyAbsent => Teardown::AlreadyAbsent,
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
