//! Session data models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::generation::{ImageModel, ImageResult};
use crate::trigger::{AspectRatio, ImageStyle, TriggerRequest};

use super::channel::ConnectionId;

/// An image generated during a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
    pub style: ImageStyle,
    pub aspect_ratio: AspectRatio,
    pub model: ImageModel,
    pub generated_at: DateTime<Utc>,
    pub credits_used: u32,
}

impl GeneratedImage {
    pub fn new(request: &TriggerRequest, result: ImageResult) -> Self {
        Self {
            url: result.url,
            prompt: request.prompt.clone(),
            style: request.style,
            aspect_ratio: request.aspect_ratio,
            model: result.model,
            generated_at: Utc::now(),
            credits_used: result.credits_used,
        }
    }
}

/// How a `bind` changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// No session existed; one was created with this channel.
    Created,
    /// An unbound session received a channel.
    Attached,
    /// The same connection joined again; nothing changed.
    Unchanged,
    /// A different connection was bound and has been discarded.
    Superseded { previous: ConnectionId },
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub conversation_id: String,
    pub owner_user_id: String,
    pub bound: bool,
    pub image_count: usize,
    pub credits_used: u32,
    pub started_at: DateTime<Utc>,
}
