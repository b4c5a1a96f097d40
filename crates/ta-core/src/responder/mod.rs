//! Response orchestration
//!
//! The `Responder` trait is the seam where a remote LLM client would plug
//! in; the shipped `MockResponder` selects keyword-driven replies locally
//! and simulates typing latency.

mod mock;

use async_trait::async_trait;

use crate::context::TripContext;
use crate::session::{EstimatePreview, Message};

pub use mock::MockResponder;

/// What the assistant says next
#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Display text
    pub text: String,
    /// Optional structured trip summary to deliver as a second message
    pub estimate: Option<EstimatePreview>,
}

/// Produces the assistant's next reply
///
/// Implementations must not fail for well-formed string input: a remote
/// implementation converts transport errors into a degraded apology reply
/// internally so the typing indicator always eventually clears.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Respond to an utterance given the session history and context
    async fn respond(
        &self,
        utterance: &str,
        history: &[Message],
        context: &TripContext,
    ) -> AssistantReply;
}
