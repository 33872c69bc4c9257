//! HTTP API module.
//!
//! Webhook ingress for the voice platform, the display WebSocket, and the
//! authenticated manual API.

mod error;
pub mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
