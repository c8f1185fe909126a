//! Conversation orchestrator
//!
//! [`ChatSession`] owns the conversation list, the model selection, and
//! the connection state, and drives chat turns against a [`ChatBackend`].
//! Multi-model turns run sequentially: the next model starts only after
//! the previous one completed or failed. Every conversation-list change
//! is persisted through the bounded store in [`store`].

pub mod conversation;
pub mod store;

pub use conversation::{derive_title, Conversation};

use crate::client::{ChatBackend, ChatMessage};
use crate::client::ModelTag;
use crate::storage::{keys, KeyValueStore};

use futures::StreamExt;
use std::sync::Arc;

/// Default prompt when a message carries images but no text
const IMAGE_ONLY_PROMPT: &str = "What is in this image?";

/// Stateful chat session over a backend and a key-value store
///
/// The session is single-writer: all mutation goes through `&mut self`,
/// and persistence is last-write-wins at turn boundaries.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    store: Box<dyn KeyValueStore>,
    models: Vec<ModelTag>,
    selected_models: Vec<String>,
    connected: bool,
    conversations: Vec<Conversation>,
    active_id: Option<String>,
}

impl ChatSession {
    /// Create a session, restoring conversations and the model selection
    /// from the store
    pub fn new(backend: Arc<dyn ChatBackend>, store: Box<dyn KeyValueStore>) -> Self {
        let conversations = store::load_conversations(store.as_ref());
        let selected_models = load_selected_models(store.as_ref());

        Self {
            backend,
            store,
            models: Vec::new(),
            selected_models,
            connected: false,
            conversations,
            active_id: None,
        }
    }

    /// Known models from the last successful refresh
    pub fn models(&self) -> &[ModelTag] {
        &self.models
    }

    /// Currently selected model names, in selection order
    pub fn selected_models(&self) -> &[String] {
        &self.selected_models
    }

    /// Whether the last connectivity probe succeeded
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// All conversations, newest first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// The active conversation, if one is selected
    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.active_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Probe the upstream and refresh the model listing
    ///
    /// The listing replaces the previous snapshot wholesale. When nothing
    /// is selected yet, the first listed model is auto-selected.
    pub async fn refresh_models(&mut self) {
        self.connected = self.backend.check_connection().await;
        self.models = self.backend.list_models().await;
        tracing::info!(
            "Refreshed models: connected={}, {} available",
            self.connected,
            self.models.len()
        );

        if self.selected_models.is_empty() {
            if let Some(first) = self.models.first() {
                tracing::debug!("Auto-selecting first model: {}", first.name);
                self.selected_models.push(first.name.clone());
                self.persist_selection();
            }
        }
    }

    /// Toggle a model in or out of the selection
    ///
    /// Selection keeps insertion order and never holds duplicates.
    pub fn toggle_model_selection(&mut self, name: &str) {
        if let Some(pos) = self.selected_models.iter().position(|m| m == name) {
            self.selected_models.remove(pos);
        } else {
            self.selected_models.push(name.to_string());
        }
        self.persist_selection();
    }

    /// Start a fresh conversation and make it active
    pub fn create_new_conversation(&mut self) -> &Conversation {
        let conversation = Conversation::new(self.selected_models.clone());
        self.active_id = Some(conversation.id.clone());
        self.conversations.insert(0, conversation);
        self.persist_conversations();
        // Just inserted at the front.
        &self.conversations[0]
    }

    /// Make an existing conversation active
    ///
    /// Returns false when no conversation with that id exists.
    pub fn activate_conversation(&mut self, id: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Delete one conversation
    ///
    /// Deleting the active conversation clears the active reference; no
    /// other conversation is promoted.
    pub fn delete_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        self.persist_conversations();
    }

    /// Delete all conversations and clear the stored list
    pub fn clear_all_conversations(&mut self) {
        self.conversations.clear();
        self.active_id = None;
        if let Err(e) = self.store.remove(keys::CONVERSATIONS) {
            tracing::warn!("Failed to clear conversation store: {}", e);
        }
    }

    /// Send a message and collect the full responses
    ///
    /// See [`send_message_with`](Self::send_message_with); this variant
    /// discards streaming progress.
    pub async fn send_message(&mut self, text: &str, images: Vec<String>) {
        self.send_message_with(text, images, &mut |_, _| {}).await;
    }

    /// Send a message, streaming responses from every selected model
    ///
    /// A no-op when nothing is selected or the input is fully empty.
    /// Ensures an active conversation, appends the user turn (with a
    /// default prompt when only images were given), then queries each
    /// selected model in order. `observer` is called with the model name
    /// and the accumulated text after every fragment. A failing model
    /// leaves one error message tagged to it and the turn moves on.
    pub async fn send_message_with(
        &mut self,
        text: &str,
        images: Vec<String>,
        observer: &mut dyn FnMut(&str, &str),
    ) {
        let text = text.trim();
        if self.selected_models.is_empty() {
            tracing::debug!("Ignoring message: no model selected");
            return;
        }
        if text.is_empty() && images.is_empty() {
            tracing::debug!("Ignoring empty message");
            return;
        }

        if self.active_conversation().is_none() {
            self.create_new_conversation();
        }

        let content = if text.is_empty() {
            IMAGE_ONLY_PROMPT.to_string()
        } else {
            text.to_string()
        };
        let has_images = !images.is_empty();
        let user_message = ChatMessage::user_with_images(content.clone(), images);

        let history = {
            // create_new_conversation above guarantees an active entry.
            let Some(conversation) = self.active_conversation_mut() else {
                return;
            };
            if conversation.has_default_title() && conversation.messages.is_empty() {
                conversation.title = derive_title(&content, has_images);
            }
            conversation.messages.push(user_message);
            conversation.messages.clone()
        };
        self.persist_conversations();

        let selected = self.selected_models.clone();
        let backend = Arc::clone(&self.backend);
        for model in &selected {
            match backend.stream_chat(model, &history).await {
                Ok(mut stream) => {
                    let mut acc = String::new();
                    let mut failed = false;
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(fragment) => {
                                acc.push_str(&fragment);
                                self.update_assistant_text(model, &acc);
                                observer(model, &acc);
                            }
                            Err(e) => {
                                tracing::warn!("Stream from {} failed: {}", model, e);
                                acc = format!("Error: {}", e);
                                self.update_assistant_text(model, &acc);
                                observer(model, &acc);
                                failed = true;
                                break;
                            }
                        }
                    }
                    if acc.is_empty() && !failed {
                        // Model produced nothing; record an empty reply so
                        // the turn structure stays visible.
                        self.update_assistant_text(model, "");
                        observer(model, "");
                    }
                }
                Err(e) => {
                    tracing::warn!("Chat request to {} failed: {}", model, e);
                    let message = format!("Error: {}", e);
                    self.update_assistant_text(model, &message);
                    observer(model, &message);
                }
            }
            self.persist_conversations();
        }
    }

    /// Read a stored preference value
    pub fn preference(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read preference '{}': {}", key, e);
                None
            }
        }
    }

    /// Write a stored preference value
    pub fn set_preference(&mut self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!("Failed to persist preference '{}': {}", key, e);
        }
    }

    fn active_conversation_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.active_id.clone()?;
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Set the running assistant text for `model` in the active conversation
    ///
    /// Replaces the last message in place iff it is an assistant message
    /// tagged with the same model; otherwise appends a new tagged one.
    fn update_assistant_text(&mut self, model: &str, text: &str) {
        let Some(conversation) = self.active_conversation_mut() else {
            return;
        };
        match conversation.messages.last_mut() {
            Some(last)
                if last.role == crate::client::Role::Assistant
                    && last.model.as_deref() == Some(model) =>
            {
                last.content = text.to_string();
            }
            _ => {
                conversation
                    .messages
                    .push(ChatMessage::assistant_for(model, text));
            }
        }
    }

    fn persist_conversations(&mut self) {
        store::save_conversations(self.store.as_mut(), &self.conversations);
    }

    fn persist_selection(&mut self) {
        let payload = match serde_json::to_string(&self.selected_models) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Failed to serialize model selection: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(keys::SELECTED_MODELS, &payload) {
            tracing::warn!("Failed to persist model selection: {}", e);
        }
    }
}

fn load_selected_models(store: &dyn KeyValueStore) -> Vec<String> {
    let payload = match store.get(keys::SELECTED_MODELS) {
        Ok(Some(p)) => p,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to read model selection: {}", e);
            return Vec::new();
        }
    };
    serde_json::from_str(&payload).unwrap_or_default()
}
