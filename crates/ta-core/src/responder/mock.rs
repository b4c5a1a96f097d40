//! Mock response orchestrator
//!
//! Reply selection is keyword-driven and reproducible for identical
//! utterance + context; only the artificial delay carries jitter, and the
//! jitter itself is derived from the utterance so tests stay stable.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::ChatConfig;
use crate::context::TripContext;
use crate::responder::{AssistantReply, Responder};
use crate::session::{EstimatePreview, Message};

/// English greetings match as whole words so "hi" does not fire inside
/// "this"; the Korean stem matches as a substring to cover its
/// conjugations (안녕, 안녕하세요, ...)
fn is_greeting(lowered: &str) -> bool {
    if lowered.contains("안녕") {
        return true;
    }
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| matches!(word, "hello" | "hi" | "hey"))
}

/// Heuristic stand-in for a remote AI backend
pub struct MockResponder {
    base_delay_ms: u64,
    jitter_ms: u64,
    estimate_after: usize,
}

impl MockResponder {
    /// Create a responder from chat configuration
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            base_delay_ms: config.typing_delay_ms,
            jitter_ms: config.typing_jitter_ms,
            estimate_after: config.estimate_after_messages,
        }
    }

    /// Bounded typing delay: base plus utterance-derived jitter
    fn typing_delay(&self, utterance: &str) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            (utterance.chars().count() as u64 * 37) % self.jitter_ms
        };
        Duration::from_millis(self.base_delay_ms + jitter)
    }

    fn select_text(&self, utterance: &str, context: &TripContext) -> String {
        let lowered = utterance.to_lowercase();

        if is_greeting(&lowered) {
            return "Hello! Tell me where you would like to go and I can help plan the trip."
                .to_string();
        }

        if let Some(destination) = &context.destination {
            if !context.has_dates() {
                return format!(
                    "{destination} is a great choice! How many nights are you planning to stay?"
                );
            }
            if context.party.is_empty() {
                return format!("Got it, a trip to {destination}. How many people are travelling?");
            }
            if context.preferences.is_empty() {
                return format!(
                    "Sounds good! Are you more into sightseeing, relaxation, or local food in {destination}?"
                );
            }
            return format!(
                "Great, I have a good picture of your {destination} trip now. Anything else you'd like to add?"
            );
        }

        // unrecognized input falls through to a clarifying question
        "Could you tell me a bit more? A destination city is the best place to start.".to_string()
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(
        &self,
        utterance: &str,
        history: &[Message],
        context: &TripContext,
    ) -> AssistantReply {
        tokio::time::sleep(self.typing_delay(utterance)).await;

        let text = self.select_text(utterance, context);
        let estimate = if history.len() >= self.estimate_after {
            EstimatePreview::from_context(context)
        } else {
            None
        };
        debug!(
            history = history.len(),
            with_estimate = estimate.is_some(),
            "mock reply selected"
        );

        AssistantReply { text, estimate }
    }
}
