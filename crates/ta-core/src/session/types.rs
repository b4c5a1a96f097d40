//! Session and message types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{PartySize, TripContext};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Estimate,
}

/// Structured trip summary the assistant attaches once enough is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatePreview {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nights: u32,
    pub party: PartySize,
    pub preferences: Vec<String>,
}

impl EstimatePreview {
    /// Build a preview from a context, if it holds a destination and dates
    pub fn from_context(context: &TripContext) -> Option<Self> {
        let destination = context.destination.clone()?;
        let start_date = context.start_date?;
        let end_date = context.end_date?;
        let nights = (end_date - start_date).num_days().max(0) as u32;
        Some(Self {
            destination,
            start_date,
            end_date,
            nights,
            party: context.party,
            preferences: context.preferences.clone(),
        })
    }

    /// One-line display form
    pub fn summary(&self) -> String {
        format!(
            "{} · {} ~ {} ({} nights) · {} traveller(s)",
            self.destination,
            self.start_date,
            self.end_date,
            self.nights,
            self.party.total().max(1)
        )
    }
}

/// A single chat message, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    /// Estimate payload, present only on `MessageKind::Estimate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimatePreview>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user text message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            kind: MessageKind::Text,
            content: text.into(),
            estimate: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant text message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            kind: MessageKind::Text,
            content: text.into(),
            estimate: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant estimate message with its preview payload
    pub fn estimate(text: impl Into<String>, preview: EstimatePreview) -> Self {
        Self {
            role: Role::Assistant,
            kind: MessageKind::Estimate,
            content: text.into(),
            estimate: Some(preview),
            created_at: Utc::now(),
        }
    }
}

/// One chat conversation with its message history and trip context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Title derived from the first user message
    pub title: Option<String>,
    /// Conversation messages, in append order
    pub messages: Vec<Message>,
    /// Trip facts accumulated from this conversation
    pub context: TripContext,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            messages: Vec::new(),
            context: TripContext::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message; the first user message also titles the session
    pub fn add_message(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            self.title = Some(derive_title(&message.content));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Get message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if session has no messages yet
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_title(text: &str) -> String {
    const MAX_CHARS: usize = 30;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(MAX_CHARS).collect();
        title.push('…');
        title
    }
}
