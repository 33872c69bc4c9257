//! Trigger detection from explicit tool invocations.

use log::debug;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{ConversationEvent, TriggerRequest};
use super::TriggerStrategy;

/// Tool names the voice agent uses to request an image.
pub const IMAGE_TOOL_NAMES: &[&str] = &["generate_image", "show_image"];

/// Why a tool call's arguments could not be decoded.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("prompt is missing or empty")]
    MissingPrompt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArguments {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default, alias = "aspect_ratio")]
    aspect_ratio: Option<String>,
}

/// Decodes `generate_image` style tool calls into trigger requests.
#[derive(Debug, Clone)]
pub struct StructuredStrategy {
    tool_names: Vec<String>,
}

impl StructuredStrategy {
    pub fn new(tool_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tool_names: tool_names.into_iter().map(Into::into).collect(),
        }
    }

    fn is_image_tool(&self, name: &str) -> bool {
        self.tool_names.iter().any(|n| n == name)
    }
}

impl Default for StructuredStrategy {
    fn default() -> Self {
        Self::new(IMAGE_TOOL_NAMES.iter().copied())
    }
}

impl TriggerStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn extract(&self, event: &ConversationEvent) -> Vec<TriggerRequest> {
        event
            .tool_calls
            .iter()
            .filter(|call| self.is_image_tool(&call.name))
            .filter_map(|call| match decode_arguments(&call.arguments) {
                Ok(request) => Some(request),
                Err(e) => {
                    debug!("Ignoring {} tool call: {}", call.name, e);
                    None
                }
            })
            .collect()
    }
}

/// Decode tool call arguments given either as an object or a JSON string.
pub fn decode_arguments(arguments: &Value) -> Result<TriggerRequest, ArgumentError> {
    let parsed;
    let object = match arguments {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)?;
            &parsed
        }
        other => other,
    };

    if !object.is_object() {
        return Err(ArgumentError::NotAnObject);
    }

    let raw: RawArguments = serde_json::from_value(object.clone())?;
    let prompt = raw
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(ArgumentError::MissingPrompt)?;

    Ok(TriggerRequest::from_parts(
        prompt,
        raw.style.as_deref(),
        raw.aspect_ratio.as_deref(),
    ))
}
