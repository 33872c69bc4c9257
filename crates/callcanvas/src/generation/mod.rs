//! Image generation provider client module.
//!
//! One request per trigger, single attempt. Retries are the provider's
//! concern; callers decide what to record on failure.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::ReplicateClient;
pub use error::{GenerationError, GenerationResult};
pub use types::*;

use crate::trigger::TriggerRequest;

/// Trait for image generation backends (allows mocking in tests).
///
/// Implementations must be safe to call concurrently and keep no per-call
/// mutable state.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, user_id: &str, request: &TriggerRequest)
    -> GenerationResult<ImageResult>;
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn generate(
        &self,
        user_id: &str,
        request: &TriggerRequest,
    ) -> GenerationResult<ImageResult> {
        log::debug!(
            "Requesting {} image for user {}: {}",
            self.model(),
            user_id,
            request.prompt
        );
        self.create_image(request).await
    }
}
