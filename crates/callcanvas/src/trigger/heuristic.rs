//! Trigger detection from the voice agent's spoken lead-in phrases.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::types::{ConversationEvent, TriggerRequest};
use super::TriggerStrategy;

/// Maximum prompt length, in characters, when the whole utterance is used.
pub const FALLBACK_PROMPT_CHARS: usize = 200;

/// Lead-in patterns; group 1 captures the image description.
static LEAD_IN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)let me show you\s+(.+?)(?:[.!?]|$)",
        r"(?i)here(?:'|’)?s what\s+([^.!?]+?)\s+looks?\s+like",
        r"(?i)generating an image of\s+(.+?)(?:[.!?]|$)",
        r"(?i)visualizing\s+([^.!?]+?)\s+for you",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("lead-in pattern is valid"))
    .collect()
});

/// Extracts an image prompt from an assistant utterance.
#[derive(Debug, Clone, Default)]
pub struct HeuristicStrategy {
    forced_fallback: bool,
}

impl HeuristicStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// When enabled, an utterance matching no lead-in still triggers, using
    /// the utterance itself (truncated) as the prompt.
    pub fn with_forced_fallback(mut self, forced: bool) -> Self {
        self.forced_fallback = forced;
        self
    }

    fn prompt_from_message(&self, message: &str) -> Option<String> {
        if let Some(prompt) = extract_lead_in(message) {
            return Some(prompt);
        }

        if self.forced_fallback {
            let truncated: String = message.trim().chars().take(FALLBACK_PROMPT_CHARS).collect();
            if !truncated.is_empty() {
                return Some(truncated);
            }
        }

        None
    }
}

impl TriggerStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, event: &ConversationEvent) -> Vec<TriggerRequest> {
        if !event.is_assistant_utterance() || !event.tool_calls.is_empty() {
            return Vec::new();
        }

        let Some(message) = event.message.as_deref() else {
            return Vec::new();
        };

        match self.prompt_from_message(message) {
            Some(prompt) => {
                debug!("Utterance matched image lead-in: {}", prompt);
                vec![TriggerRequest::new(prompt)]
            }
            None => Vec::new(),
        }
    }
}

/// Return the description following the first matching lead-in phrase.
pub fn extract_lead_in(message: &str) -> Option<String> {
    LEAD_IN_PATTERNS.iter().find_map(|pattern| {
        let captured = pattern.captures(message)?.get(1)?.as_str().trim();
        (!captured.is_empty()).then(|| captured.to_string())
    })
}
