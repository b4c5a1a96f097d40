//! ta-core: Trip Assist Chat Core Library
//!
//! Chat session lifecycle, heuristic trip-context extraction, and
//! response orchestration for the travel-assistant feature.

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod responder;
pub mod session;

pub use config::ChatConfig;
pub use context::{ContextDelta, PartySize, TripContext, extract};
pub use controller::{ChatState, ConversationController, DestructiveAction};
pub use error::{Error, Result};
pub use responder::{AssistantReply, MockResponder, Responder};
pub use session::{EstimatePreview, Message, MessageKind, Role, Session, SessionManager, SessionStore};
