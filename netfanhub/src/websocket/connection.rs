use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::websocket::frame::{CloseReason, Frame, Outbound};

/// Type alias for the send half of a connection, erased over the transport
pub type BoxedSink = Pin<Box<dyn Sink<Outbound, Error = Error> + Send>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque owner token of a connection, used only as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A fresh identity for a client that presented no token.
    pub fn anonymous() -> Self {
        Self(format!("anonymous-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Identity {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Process-unique, monotonically increasing id. A larger id means the
/// connection was accepted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Send half of an accepted connection plus its lifecycle state.
///
/// The receive half is never stored here: it is owned by the session that
/// accepted the connection, so only that session can drive it.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    sink: Mutex<BoxedSink>,
    state: AtomicU8,
}

impl Connection {
    pub fn new(identity: Identity, sink: BoxedSink) -> Self {
        Self {
            id: ConnectionId::next(),
            identity,
            sink: Mutex::new(sink),
            state: AtomicU8::new(ConnectionState::Open as u8),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send one frame. Safe to call from many sessions at once; sends are
    /// serialized on the sink.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        self.sink.lock().await.send(Outbound::Frame(frame)).await
    }

    /// Stop accepting broadcast traffic. Returns `false` if the connection
    /// had already left the `Open` state.
    pub fn mark_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Perform the close handshake. Only the first caller sends a close
    /// frame; later calls return `Ok(false)`.
    pub async fn close(&self, reason: CloseReason) -> Result<bool> {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if ConnectionState::from(previous) == ConnectionState::Closed {
            return Ok(false);
        }
        self.sink.lock().await.send(Outbound::Close(reason)).await?;
        Ok(true)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
