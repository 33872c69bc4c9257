//! Application state.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::bridge::SessionBridge;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The session bridge. Constructed once per process.
    pub bridge: Arc<SessionBridge>,
    /// Authentication state.
    pub auth: AuthState,
    /// Shared secret expected in `X-Webhook-Token`; `None` disables the check.
    pub webhook_token: Option<String>,
    /// Whether the image provider has credentials.
    pub generator_configured: bool,
}

impl AppState {
    pub fn new(bridge: Arc<SessionBridge>, auth: AuthState) -> Self {
        Self {
            bridge,
            auth,
            webhook_token: None,
            generator_configured: true,
        }
    }

    pub fn with_webhook_token(mut self, token: Option<String>) -> Self {
        self.webhook_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_generator_configured(mut self, configured: bool) -> Self {
        self.generator_configured = configured;
        self
    }
}
