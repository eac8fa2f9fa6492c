//! Real-time WebSocket fan-out hub.
//!
//! Every frame a client sends is relayed to every connected client. The
//! [`websocket::ConnectionRegistry`] keeps one live connection per identity and
//! [`websocket::Hub::serve`] runs one connection's session until it closes.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub(crate) mod signal;
pub mod websocket;
