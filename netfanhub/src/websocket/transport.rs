//! Adapts an axum [`WebSocket`] to the session's sink/stream shapes.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::{future, SinkExt, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::websocket::connection::BoxedSink;
use crate::websocket::frame::{CloseReason, Frame, FrameKind, Inbound, Outbound};

/// Split an upgraded socket into a shareable send half and the receive half
/// owned by the session.
pub fn split_socket(
    socket: WebSocket,
) -> (
    BoxedSink,
    impl Stream<Item = Result<Inbound>> + Unpin + Send,
) {
    let (sender, receiver) = socket.split();
    let sender = sender
        .sink_map_err(Error::from)
        .with(|outbound: Outbound| future::ready(Message::try_from(outbound)));
    let receiver = receiver.map(|message| message.map(Inbound::from).map_err(Error::from));
    (Box::pin(sender), receiver)
}

// axum hands over whole messages, so every inbound frame is final.
impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Inbound::Frame(Frame::text(Bytes::copy_from_slice(
                text.as_str().as_bytes(),
            ))),
            Message::Binary(data) => Inbound::Frame(Frame::binary(data)),
            Message::Ping(_) | Message::Pong(_) => Inbound::Control,
            Message::Close(frame) => {
                Inbound::Close(frame.map(|f| CloseReason::new(f.code, f.reason.as_str())))
            }
        }
    }
}

impl TryFrom<Outbound> for Message {
    type Error = Error;

    fn try_from(outbound: Outbound) -> Result<Self> {
        match outbound {
            Outbound::Frame(frame) if !frame.fin => Err(Error::FragmentUnsupported),
            Outbound::Frame(Frame {
                kind: FrameKind::Text,
                payload,
                ..
            }) => Ok(Message::Text(String::from_utf8(payload.to_vec())?.into())),
            Outbound::Frame(Frame {
                kind: FrameKind::Binary,
                payload,
                ..
            }) => Ok(Message::Binary(payload)),
            Outbound::Close(reason) => Ok(Message::Close(Some(CloseFrame {
                code: reason.code,
                reason: reason.reason.into(),
            }))),
        }
    }
}
