pub mod connection;
pub mod connection_registry;
pub mod frame;
pub mod handler;
pub mod session;
pub mod transport;

pub use connection::{BoxedSink, Connection, ConnectionId, ConnectionState, Identity};
pub use connection_registry::{ConnectionRegistry, Removal};
pub use frame::{CloseReason, Frame, FrameKind, Inbound, Outbound};
pub use handler::websocket_handler;
pub use session::{FanOut, Hub, SessionReport, Teardown, Termination};
