//! Conversation model
//!
//! A conversation is an ordered message transcript plus the model
//! selection that was active when it was created. IDs are ULIDs, so
//! lexicographic order matches creation order.

use crate::client::ChatMessage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum title length derived from the first message
const TITLE_PREFIX_CHARS: usize = 30;

/// A single chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Time-ordered unique identifier
    pub id: String,
    /// Display title, derived once from the first message
    pub title: String,
    /// Ordered message transcript
    pub messages: Vec<ChatMessage>,
    /// Models selected when this conversation was created
    pub models: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation for the given model selection
    pub fn new(models: Vec<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            title: "New Chat".to_string(),
            messages: Vec::new(),
            models,
            created_at: Utc::now(),
        }
    }

    /// Whether the title has been derived from a first message yet
    pub fn has_default_title(&self) -> bool {
        self.title == "New Chat"
    }
}

/// Derive a conversation title from its first user message
///
/// Takes a 30-character prefix (an ellipsis marks truncation) and prefixes
/// an image marker when the message carried attachments. An empty text
/// with images falls back to "Image analysis".
pub fn derive_title(content: &str, has_images: bool) -> String {
    let trimmed = content.trim();

    let base = if trimmed.is_empty() {
        if has_images {
            "Image analysis".to_string()
        } else {
            "New Chat".to_string()
        }
    } else if trimmed.chars().count() > TITLE_PREFIX_CHARS {
        let prefix: String = trimmed.chars().take(TITLE_PREFIX_CHARS).collect();
        format!("{}...", prefix)
    } else {
        trimmed.to_string()
    };

    if has_images {
        format!("🖼️ {}", base)
    } else {
        base
    }
}
