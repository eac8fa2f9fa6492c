//! Transport-agnostic units exchanged between a session and its socket.

use bytes::Bytes;

/// Whether a frame carries UTF-8 text or opaque binary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Text,
    Binary,
}

/// One physical data frame as received from a peer.
///
/// `fin` marks the last frame of a logical message. Frames are relayed as-is,
/// never reassembled or split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
    pub fin: bool,
}

impl Frame {
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: payload.into(),
            fin: true,
        }
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
            fin: true,
        }
    }

    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }
}

/// Close code and reason exchanged during the close handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const INTERNAL_ERROR: u16 = 1011;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(Self::NORMAL, "")
    }

    pub fn going_away() -> Self {
        Self::new(Self::GOING_AWAY, "server shutting down")
    }

    /// Fallback used when the session ends without a peer-supplied close.
    pub fn receive_failed() -> Self {
        Self::new(Self::INTERNAL_ERROR, "receive failed")
    }
}

/// What a single receive on a connection can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    /// Peer started the close handshake, optionally with a code and reason.
    Close(Option<CloseReason>),
    /// Ping/pong traffic; answered by the transport and never relayed.
    Control,
}

/// What a session may push into a connection's send half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Close(CloseReason),
}
