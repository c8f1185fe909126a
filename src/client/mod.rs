//! Upstream client abstraction and common chat types
//!
//! This module defines the message and model types shared by the whole
//! crate, along with the [`ChatBackend`] trait that the conversation
//! orchestrator talks to. The concrete Ollama implementation lives in
//! [`ollama`]; tests substitute a scripted fake.

pub mod ollama;

pub use ollama::OllamaClient;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A lazy, finite stream of generated-text fragments.
///
/// The stream is not restartable: once consumed it reflects exactly one
/// chat turn. Fragment order matches transport arrival order.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input
    User,
    /// Model-generated output
    Assistant,
    /// System instruction
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Message structure for a conversation turn
///
/// Images are base64-encoded blobs attached only at creation time (vision
/// models). The `model` field records which model produced an assistant
/// turn; it is local bookkeeping and is never sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Text content of the message
    pub content: String,
    /// Optional inline images (base64, vision models only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Which model generated this message (assistant turns only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatMessage {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::client::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: None,
            model: None,
        }
    }

    /// Creates a new user message carrying inline images
    ///
    /// An empty image list is normalized to `None`.
    pub fn user_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: if images.is_empty() { None } else { Some(images) },
            model: None,
        }
    }

    /// Creates an assistant message tagged with the producing model
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::client::ChatMessage;
    ///
    /// let msg = ChatMessage::assistant_for("llama3.2:latest", "Hi there");
    /// assert_eq!(msg.model.as_deref(), Some("llama3.2:latest"));
    /// ```
    pub fn assistant_for(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: None,
            model: Some(model.into()),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: None,
            model: None,
        }
    }
}

/// Model metadata from the upstream listing endpoint
///
/// An immutable snapshot: each listing call replaces the previous set
/// wholesale, entries are never merged or patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTag {
    /// Model name/identifier (e.g. "llama3.2:latest")
    pub name: String,
    /// Last-modified timestamp as reported upstream (RFC-3339)
    #[serde(default)]
    pub modified_at: String,
    /// On-disk size in bytes
    #[serde(default)]
    pub size: u64,
    /// Content digest of the model blob
    #[serde(default)]
    pub digest: String,
}

/// Check whether a model accepts inline image input
///
/// Detection is a name-pattern heuristic, not a capability query: the
/// upstream listing endpoint does not report vision support.
///
/// # Examples
///
/// ```
/// use chatrelay::client::is_vision_model;
///
/// assert!(is_vision_model("llava:13b"));
/// assert!(!is_vision_model("llama3.2:latest"));
/// ```
pub fn is_vision_model(name: &str) -> bool {
    const VISION_PATTERNS: &[&str] = &[
        "llava",
        "vision",
        "bakllava",
        "moondream",
        "cogvlm",
        "minicpm-v",
    ];
    let lower = name.to_lowercase();
    VISION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Format byte size for display
///
/// # Examples
///
/// ```
/// use chatrelay::client::format_size;
///
/// assert_eq!(format_size(1073741824), "1.0GB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1}{}", size, UNITS[unit_idx])
}

/// Backend trait for the upstream model server
///
/// The conversation orchestrator is written against this trait so that
/// tests can substitute a scripted fake for the real HTTP client. The
/// backend owns no conversation state; every call is a pure function of
/// its inputs.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// List available models
    ///
    /// Fails soft: any network or parse error is swallowed (and logged)
    /// and an empty list is returned, so callers can always render
    /// *something* instead of a blocking error.
    async fn list_models(&self) -> Vec<ModelTag>;

    /// Check whether the upstream server is reachable
    ///
    /// Returns true iff the listing endpoint responds with a success
    /// status; any exception is treated as false.
    async fn check_connection(&self) -> bool;

    /// Open a streaming chat request for one model
    ///
    /// # Arguments
    ///
    /// * `model` - Model identifier to generate with
    /// * `messages` - Full ordered message history for the turn
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued or the upstream
    /// responds with a non-success status before any fragment is yielded.
    /// Transport failures mid-stream surface as `Err` items on the stream.
    async fn stream_chat(&self, model: &str, messages: &[ChatMessage]) -> Result<FragmentStream>;
}
