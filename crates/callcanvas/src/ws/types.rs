//! WebSocket message types for the display protocol.
//!
//! These types define the protocol between display clients and the bridge.
//! Every frame is a JSON object tagged by `type` with camelCase fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::GeneratedImage;

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Events pushed from the bridge to a display client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    // ========== Connection Events ==========
    /// Connection established.
    Connected { message: String },

    /// Token accepted.
    Authenticated { user_id: String },

    /// Reply to a client `ping`.
    Pong,

    /// Error message. Not fatal unless followed by a close.
    Error { message: String },

    // ========== Session Events ==========
    /// This connection is now the display for the conversation.
    Joined { conversation_id: String },

    /// This connection left the conversation.
    Left { conversation_id: String },

    /// The conversation ended; no further events follow for it.
    SessionEnded {
        conversation_id: String,
        image_count: usize,
    },

    // ========== Image Events ==========
    /// A generation was dispatched.
    ImageGenerating {
        conversation_id: String,
        prompt: String,
        timestamp: DateTime<Utc>,
    },

    /// A generation finished and was recorded.
    ImageGenerated {
        conversation_id: String,
        image: GeneratedImage,
        timestamp: DateTime<Utc>,
    },

    /// A generation failed.
    ImageError {
        conversation_id: String,
        prompt: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// Commands (Client -> Server)
// ============================================================================

/// Commands sent from a display client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Present an access token.
    Authenticate {
        #[serde(default)]
        token: Option<String>,
    },

    /// Become the display for a conversation.
    JoinConversation { conversation_id: String },

    /// Stop displaying the current conversation and end its session.
    LeaveConversation,

    /// Request an image outside the conversation flow.
    ManualGenerate {
        prompt: String,
        #[serde(default)]
        style: Option<String>,
        #[serde(default)]
        aspect_ratio: Option<String>,
    },

    /// Application-level keepalive.
    Ping,
}

impl ClientCommand {
    /// Command types the server understands.
    pub const KNOWN_TYPES: [&'static str; 5] = [
        "authenticate",
        "join_conversation",
        "leave_conversation",
        "manual_generate",
        "ping",
    ];
}

/// Result of decoding one text frame.
#[derive(Debug)]
pub enum ParsedCommand {
    Command(ClientCommand),
    /// Valid JSON with an unrecognized or missing `type`.
    Unknown(String),
    /// Not JSON, or a known type with invalid fields.
    Malformed(String),
}

impl ParsedCommand {
    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return ParsedCommand::Malformed(format!("invalid JSON: {}", e)),
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !ClientCommand::KNOWN_TYPES.contains(&kind.as_str()) {
            return ParsedCommand::Unknown(kind);
        }

        match serde_json::from_value(value) {
            Ok(cmd) => ParsedCommand::Command(cmd),
            Err(e) => ParsedCommand::Malformed(format!("invalid {} message: {}", kind, e)),
        }
    }
}
