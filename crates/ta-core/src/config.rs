//! Configuration for the chat core
//!
//! All fields have serde defaults, so a partial (or absent) TOML file is fine.
//! Tests shrink the delay fields to keep runs fast.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Chat core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum number of concurrent sessions a user may hold
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Base simulated typing delay before an assistant reply (milliseconds)
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,

    /// Upper bound for the deterministic jitter added to the typing delay
    #[serde(default = "default_typing_jitter_ms")]
    pub typing_jitter_ms: u64,

    /// Delay before the welcome message in a fresh session (milliseconds)
    #[serde(default = "default_welcome_delay_ms")]
    pub welcome_delay_ms: u64,

    /// Stagger between an assistant text message and its estimate attachment
    #[serde(default = "default_estimate_stagger_ms")]
    pub estimate_stagger_ms: u64,

    /// Minimum message count before an estimate may be attached
    #[serde(default = "default_estimate_after_messages")]
    pub estimate_after_messages: usize,

    /// SQLite database path; `None` keeps sessions in memory only
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            typing_delay_ms: default_typing_delay_ms(),
            typing_jitter_ms: default_typing_jitter_ms(),
            welcome_delay_ms: default_welcome_delay_ms(),
            estimate_stagger_ms: default_estimate_stagger_ms(),
            estimate_after_messages: default_estimate_after_messages(),
            db_path: None,
        }
    }
}

impl ChatConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Configuration with near-zero delays, for tests
    pub fn fast() -> Self {
        Self {
            typing_delay_ms: 5,
            typing_jitter_ms: 0,
            welcome_delay_ms: 5,
            estimate_stagger_ms: 5,
            ..Self::default()
        }
    }
}

fn default_max_sessions() -> usize {
    3
}

fn default_typing_delay_ms() -> u64 {
    1200
}

fn default_typing_jitter_ms() -> u64 {
    600
}

fn default_welcome_delay_ms() -> u64 {
    400
}

fn default_estimate_stagger_ms() -> u64 {
    800
}

fn default_estimate_after_messages() -> usize {
    3
}
