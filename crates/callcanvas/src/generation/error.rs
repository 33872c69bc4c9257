//! Image generation error types.

use thiserror::Error;

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors that can occur while generating an image.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("Image provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },

    /// Provider credentials are not configured.
    #[error("Image provider not configured: {0}")]
    NotConfigured(String),

    /// The prediction finished without success.
    #[error("Image generation failed: {0}")]
    PredictionFailed(String),

    /// The prediction did not finish within the allowed time.
    #[error("Image generation timed out after {0}s")]
    TimedOut(u64),

    /// The prediction succeeded but returned no image.
    #[error("Image provider returned no image")]
    NoOutput,

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The session ended before the result could be delivered.
    #[error("Generation was cancelled")]
    Cancelled,
}
