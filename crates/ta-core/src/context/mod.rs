//! Trip context: structured facts inferred from free-text messages
//!
//! The extractor produces additive deltas; `TripContext::merge` folds them
//! into the per-session accumulator without touching unrelated fields.

mod extractor;
mod types;

pub use extractor::{extract, extract_on};
pub use types::{ContextDelta, PartySize, TripContext};
