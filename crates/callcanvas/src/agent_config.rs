//! Voice agent configuration helpers.
//!
//! Adds the `generate_image` tool and matching prompt instructions to a voice
//! agent configuration so the agent emits structured image triggers.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::trigger::IMAGE_TOOL_NAMES;

/// Marker line that starts the appended instructions.
const INSTRUCTIONS_MARKER: &str =
    "You have the ability to generate images in real-time during the conversation.";

const IMAGE_INSTRUCTIONS: &str = "\
You have the ability to generate images in real-time during the conversation.
When the caller asks to see something, wants a product visualized, or needs a visual reference, use the generate_image tool.

Examples:
- Caller: \"What would a modern kitchen with granite countertops look like?\"
  You: \"Let me show you! I'm generating a visualization of a modern kitchen with granite countertops.\"
- Caller: \"Show me what black galaxy granite looks like\"
  You: \"Great choice! Here's what black galaxy granite looks like on countertops.\"

Always tell the caller you are generating an image before calling the tool.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentConfigError {
    #[error("agent config must be a JSON object")]
    NotAnObject,
    #[error("'{0}' must be a JSON object")]
    FieldNotAnObject(&'static str),
    #[error("'conversational_config.agent.tools' must be an array")]
    ToolsNotAnArray,
}

/// JSON schema of the image tool as the voice platform expects it.
pub fn image_tool_definition() -> Value {
    json!({
        "name": IMAGE_TOOL_NAMES[0],
        "description": "Generate an AI image based on a text description and show it to the user in real-time",
        "parameters": {
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Detailed description of the image to generate"
                },
                "style": {
                    "type": "string",
                    "enum": ["photorealistic", "artistic", "sketch", "modern"],
                    "description": "Visual style of the image"
                },
                "aspectRatio": {
                    "type": "string",
                    "enum": ["1:1", "16:9", "9:16", "4:3"],
                    "description": "Aspect ratio of the image"
                }
            },
            "required": ["prompt"]
        }
    })
}

/// Return `base` with the image tool and instructions added.
///
/// Existing fields are preserved. Applying it twice changes nothing.
pub fn image_enabled_agent_config(base: Value) -> Result<Value, AgentConfigError> {
    let Value::Object(mut root) = base else {
        return Err(AgentConfigError::NotAnObject);
    };

    let conversational = object_field(&mut root, "conversational_config")?;

    let agent = object_field(conversational, "agent")?;
    let tools = agent
        .entry("tools")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(tools) = tools else {
        return Err(AgentConfigError::ToolsNotAnArray);
    };
    let has_tool = tools
        .iter()
        .any(|t| t.get("name").and_then(Value::as_str) == Some(IMAGE_TOOL_NAMES[0]));
    if !has_tool {
        tools.push(image_tool_definition());
    }

    let prompt = object_field(conversational, "prompt")?;
    let existing = prompt
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !existing.contains(INSTRUCTIONS_MARKER) {
        let combined = if existing.trim().is_empty() {
            IMAGE_INSTRUCTIONS.to_string()
        } else {
            format!("{}\n\n{}", existing.trim_end(), IMAGE_INSTRUCTIONS)
        };
        prompt.insert("prompt".to_string(), Value::String(combined));
    }

    Ok(Value::Object(root))
}

fn object_field<'a>(
    parent: &'a mut Map<String, Value>,
    key: &'static str,
) -> Result<&'a mut Map<String, Value>, AgentConfigError> {
    match parent
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(map) => Ok(map),
        _ => Err(AgentConfigError::FieldNotAnObject(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_tool_and_instructions() {
        let base = json!({
            "name": "Josh",
            "conversational_config": {
                "agent": {
                    "first_message": "Hi!",
                    "tools": [{"name": "end_call"}]
                },
                "prompt": {"prompt": "You are a roofing sales assistant.", "llm": "gpt-4o"}
            }
        });

        let config = image_enabled_agent_config(base).unwrap();
        let agent = &config["conversational_config"]["agent"];
        assert_eq!(agent["first_message"], "Hi!");
        assert_eq!(agent["tools"][0]["name"], "end_call");
        assert_eq!(agent["tools"][1]["name"], "generate_image");

        let prompt = &config["conversational_config"]["prompt"];
        assert_eq!(prompt["llm"], "gpt-4o");
        let text = prompt["prompt"].as_str().unwrap();
        assert!(text.starts_with("You are a roofing sales assistant."));
        assert!(text.contains("generate_image tool"));
        assert_eq!(config["name"], "Josh");
    }

    #[test]
    fn test_is_idempotent() {
        let once = image_enabled_agent_config(json!({})).unwrap();
        let twice = image_enabled_agent_config(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            twice["conversational_config"]["agent"]["tools"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        assert_eq!(
            image_enabled_agent_config(json!([1, 2])),
            Err(AgentConfigError::NotAnObject)
        );
        assert_eq!(
            image_enabled_agent_config(json!({"conversational_config": "x"})),
            Err(AgentConfigError::FieldNotAnObject("conversational_config"))
        );
        assert_eq!(
            image_enabled_agent_config(json!({"conversational_config": {"agent": {"tools": {}}}})),
            Err(AgentConfigError::ToolsNotAnArray)
        );
    }
}
