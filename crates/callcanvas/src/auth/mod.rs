//! Authentication module.
//!
//! HS256 JWT validation for the HTTP API and the WebSocket `authenticate`
//! message, with a `dev:<user>` bypass when dev mode is enabled.

mod claims;
mod config;
mod error;
mod middleware;

pub use claims::{Claims, Role};
pub use config::{AuthConfig, ConfigValidationError, resolve_env_reference};
pub use error::AuthError;
pub use middleware::{AuthState, CurrentUser, auth_middleware, bearer_token_from_header};
