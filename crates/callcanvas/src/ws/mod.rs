//! WebSocket delivery channel for display clients.
//!
//! Provides the `/ws` endpoint: in-band authentication, conversation join,
//! manual generation requests and the server-pushed image events.

mod handler;
mod types;

pub use handler::{Connection, Flow, ws_handler};
pub use types::{ClientCommand, ParsedCommand, ServerEvent};

/// Size of the per-connection send buffer.
pub const CONNECTION_BUFFER_SIZE: usize = 64;
