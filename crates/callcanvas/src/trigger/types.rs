//! Conversation event and trigger request types.

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Visual style requested for a generated image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Photorealistic,
    Artistic,
    Sketch,
    Modern,
}

impl ImageStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStyle::Photorealistic => "photorealistic",
            ImageStyle::Artistic => "artistic",
            ImageStyle::Sketch => "sketch",
            ImageStyle::Modern => "modern",
        }
    }
}

impl std::fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "photorealistic" => Ok(ImageStyle::Photorealistic),
            "artistic" => Ok(ImageStyle::Artistic),
            "sketch" => Ok(ImageStyle::Sketch),
            "modern" => Ok(ImageStyle::Modern),
            _ => Err(format!("unknown style: {}", s)),
        }
    }
}

/// Aspect ratio requested for a generated image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "4:3")]
    Standard,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Standard => "4:3",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1:1" => Ok(AspectRatio::Square),
            "16:9" => Ok(AspectRatio::Wide),
            "9:16" => Ok(AspectRatio::Tall),
            "4:3" => Ok(AspectRatio::Standard),
            _ => Err(format!("unknown aspect ratio: {}", s)),
        }
    }
}

/// A decision that an image should be generated now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub prompt: String,
    pub style: ImageStyle,
    pub aspect_ratio: AspectRatio,
}

impl TriggerRequest {
    /// Create a request with the default photorealistic, wide preset.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: ImageStyle::default(),
            aspect_ratio: AspectRatio::default(),
        }
    }

    pub fn style(mut self, style: ImageStyle) -> Self {
        self.style = style;
        self
    }

    pub fn aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Build a request from loosely typed inputs.
    ///
    /// Unrecognized style or aspect ratio values fall back to the defaults.
    pub fn from_parts(prompt: &str, style: Option<&str>, aspect_ratio: Option<&str>) -> Self {
        let style = style
            .and_then(|s| s.parse().map_err(|e| log::debug!("{}", e)).ok())
            .unwrap_or_default();
        let aspect_ratio = aspect_ratio
            .and_then(|s| s.parse().map_err(|e| log::debug!("{}", e)).ok())
            .unwrap_or_default();
        Self {
            prompt: prompt.trim().to_string(),
            style,
            aspect_ratio,
        }
    }
}

/// A tool invocation carried by a conversation event.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub name: String,
    /// Either a JSON object or a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

/// An event delivered by the voice conversation platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub event_type: String,
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Malformed entries are dropped; `null` reads as no tool calls.
    #[serde(default, alias = "tool_calls", deserialize_with = "lenient_tool_calls")]
    pub tool_calls: Vec<ToolCall>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_tool_calls<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(other) => {
            debug!("Ignoring toolCalls that is not an array: {}", other);
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ToolCall>(item) {
            Ok(call) => Some(call),
            Err(e) => {
                debug!("Skipping malformed tool call: {}", e);
                None
            }
        })
        .collect())
}

impl ConversationEvent {
    /// Whether the event signals that the conversation is over.
    pub fn is_end_signal(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "conversation_ended" | "call_ended"
        )
    }

    /// Whether the event is an utterance spoken by the voice agent.
    pub fn is_assistant_utterance(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("assistant") || r.eq_ignore_ascii_case("agent"))
            .unwrap_or(false)
    }
}
