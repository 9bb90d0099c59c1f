//! The messaging router: connection registry, destination resolution and
//! authorization, message persistence and broadcast fan-out, plus the
//! per-connection WebSocket loops that drive them.

pub mod connection;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod store;

pub use error::RouterError;
pub use registry::{ClientHandle, ConnectionId, Registry};
pub use router::{MessageRouter, RouterConfig};
