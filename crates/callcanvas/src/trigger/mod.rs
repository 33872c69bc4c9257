//! Trigger extraction.
//!
//! Decides, from a single conversation event, whether an image should be
//! generated and with what prompt. Extraction is pure: no state, no I/O.
//!
//! Strategies are consulted in order and the first one that yields a trigger
//! wins. The default order puts explicit tool calls ahead of phrase matching.

mod heuristic;
mod structured;
mod types;

use log::debug;

pub use heuristic::{FALLBACK_PROMPT_CHARS, HeuristicStrategy, extract_lead_in};
pub use structured::{ArgumentError, IMAGE_TOOL_NAMES, StructuredStrategy, decode_arguments};
pub use types::{AspectRatio, ConversationEvent, ImageStyle, ToolCall, TriggerRequest};

/// A pluggable way of detecting image triggers in a conversation event.
pub trait TriggerStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return the triggers found in the event, in payload order.
    ///
    /// Must never panic on malformed input; undecodable content yields no
    /// trigger.
    fn extract(&self, event: &ConversationEvent) -> Vec<TriggerRequest>;
}

/// Ordered set of trigger strategies.
pub struct TriggerExtractor {
    strategies: Vec<Box<dyn TriggerStrategy>>,
}

impl TriggerExtractor {
    pub fn new(strategies: Vec<Box<dyn TriggerStrategy>>) -> Self {
        Self { strategies }
    }

    /// Structured tool calls first, then lead-in phrase matching.
    pub fn with_defaults(forced_fallback: bool) -> Self {
        Self::new(vec![
            Box::new(StructuredStrategy::default()),
            Box::new(HeuristicStrategy::new().with_forced_fallback(forced_fallback)),
        ])
    }

    pub fn extract(&self, event: &ConversationEvent) -> Vec<TriggerRequest> {
        for strategy in &self.strategies {
            let triggers = strategy.extract(event);
            if !triggers.is_empty() {
                debug!(
                    "{} strategy produced {} trigger(s)",
                    strategy.name(),
                    triggers.len()
                );
                return triggers;
            }
        }
        Vec::new()
    }
}

impl Default for TriggerExtractor {
    fn default() -> Self {
        Self::with_defaults(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> ConversationEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_structured_takes_priority() {
        let ev = event(json!({
            "conversationId": "c1",
            "role": "assistant",
            "message": "Let me show you a blue door.",
            "toolCalls": [{"name": "generate_image", "arguments": {"prompt": "a green door"}}]
        }));
        let triggers = TriggerExtractor::default().extract(&ev);
        assert_eq!(triggers, vec![TriggerRequest::new("a green door")]);
    }

    #[test]
    fn test_falls_through_to_heuristic() {
        let ev = event(json!({
            "conversationId": "c1",
            "role": "assistant",
            "message": "Let me show you a blue door."
        }));
        let triggers = TriggerExtractor::default().extract(&ev);
        assert_eq!(triggers, vec![TriggerRequest::new("a blue door")]);
    }

    #[test]
    fn test_strategies_can_be_disabled() {
        let ev = event(json!({
            "conversationId": "c1",
            "role": "assistant",
            "message": "Let me show you a blue door."
        }));
        let structured_only = TriggerExtractor::new(vec![Box::new(StructuredStrategy::default())]);
        assert!(structured_only.extract(&ev).is_empty());
    }

    #[test]
    fn test_plain_event_yields_nothing() {
        let ev = event(json!({"type": "ping", "conversationId": "c1"}));
        assert!(TriggerExtractor::default().extract(&ev).is_empty());
    }
}
