//! Session bridge.
//!
//! Keeps one session per monitored conversation and pairs two independent
//! event streams: conversation events from the voice platform and the
//! persistent connection of the display client that joined that conversation.
//!
//! A session exists only after a display joined it. Generation requests for
//! unknown conversations are dropped without creating state.

mod channel;
mod models;
mod pipeline;
mod registry;
mod service;

pub use channel::{ClientChannel, ConnectionId, PushError};
pub use models::{BindOutcome, GeneratedImage, SessionSnapshot};
pub use pipeline::GenerationTicket;
pub use registry::{BindError, Session, SessionRegistry, SessionState};
pub use service::{BridgeConfig, EventOutcome, SessionBridge};
