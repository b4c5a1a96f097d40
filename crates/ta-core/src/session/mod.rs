//! Chat sessions
//!
//! Value types, SQLite persistence, and the in-memory session manager
//! that owns session and message lifetime.

mod manager;
mod store;
mod types;

pub use manager::SessionManager;
pub use store::SessionStore;
pub use types::{EstimatePreview, Message, MessageKind, Role, Session};
