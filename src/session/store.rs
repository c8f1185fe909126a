//! Bounded conversation persistence
//!
//! Conversations are serialized as one JSON array under a single storage
//! key, newest first and capped. Images are stripped before serialization
//! (attachments are session-only); every other field survives a round
//! trip unchanged. Persistence never fails the caller: a full store
//! degrades to a smaller cap, then to clearing the key entirely.

use crate::error::ChatRelayError;
use crate::session::Conversation;
use crate::storage::{keys, KeyValueStore};

/// Maximum conversations kept in the store
pub const MAX_STORED_CONVERSATIONS: usize = 50;

/// Fallback cap when the storage backend rejects the full set
pub const REDUCED_STORED_CONVERSATIONS: usize = 20;

/// Persist the conversation list, newest first
///
/// Tries the full cap first; on a capacity rejection retries with the
/// reduced cap, and as a last resort removes the key so stale data is not
/// left behind. Storage errors are logged, never propagated.
pub fn save_conversations(store: &mut dyn KeyValueStore, conversations: &[Conversation]) {
    for cap in [MAX_STORED_CONVERSATIONS, REDUCED_STORED_CONVERSATIONS] {
        let payload = match serialize_capped(conversations, cap) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Failed to serialize conversations: {}", e);
                return;
            }
        };
        match store.set(keys::CONVERSATIONS, &payload) {
            Ok(()) => return,
            Err(e) if is_storage_full(&e) => {
                tracing::warn!(
                    "Conversation store full at cap {}, retrying smaller",
                    cap
                );
            }
            Err(e) => {
                tracing::warn!("Failed to persist conversations: {}", e);
                return;
            }
        }
    }

    tracing::warn!("Conversation store full at reduced cap, clearing");
    if let Err(e) = store.remove(keys::CONVERSATIONS) {
        tracing::warn!("Failed to clear conversation store: {}", e);
    }
}

/// Load the persisted conversation list
///
/// A missing key or unparseable payload yields an empty list.
pub fn load_conversations(store: &dyn KeyValueStore) -> Vec<Conversation> {
    let payload = match store.get(keys::CONVERSATIONS) {
        Ok(Some(p)) => p,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to read conversation store: {}", e);
            return Vec::new();
        }
    };

    match serde_json::from_str(&payload) {
        Ok(conversations) => conversations,
        Err(e) => {
            tracing::warn!("Discarding unparseable conversation store: {}", e);
            Vec::new()
        }
    }
}

fn serialize_capped(
    conversations: &[Conversation],
    cap: usize,
) -> serde_json::Result<String> {
    let capped: Vec<Conversation> = conversations
        .iter()
        .take(cap)
        .map(strip_images)
        .collect();
    serde_json::to_string(&capped)
}

/// Drop image payloads; the `model` tag and all other fields survive
fn strip_images(conversation: &Conversation) -> Conversation {
    let mut stripped = conversation.clone();
    for message in &mut stripped.messages {
        message.images = None;
    }
    stripped
}

fn is_storage_full(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ChatRelayError>(),
        Some(ChatRelayError::StorageFull { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;
    use crate::storage::MemoryStore;

    fn conversation_with_message(text: &str) -> Conversation {
        let mut conv = Conversation::new(vec!["llama3.2:latest".to_string()]);
        conv.messages.push(ChatMessage::user(text));
        conv.messages
            .push(ChatMessage::assistant_for("llama3.2:latest", "reply"));
        conv
    }

    #[test]
    fn test_roundtrip_preserves_everything_but_images() {
        let mut store = MemoryStore::new();
        let mut conv = Conversation::new(vec!["llava:13b".to_string()]);
        conv.messages.push(ChatMessage::user_with_images(
            "What is this?",
            vec!["aGVsbG8=".to_string()],
        ));
        conv.messages
            .push(ChatMessage::assistant_for("llava:13b", "A cat."));

        save_conversations(&mut store, &[conv.clone()]);
        let loaded = load_conversations(&store);

        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].messages[0].images.is_none());

        let mut expected = conv;
        expected.messages[0].images = None;
        assert_eq!(loaded[0], expected);
    }

    #[test]
    fn test_load_missing_key_returns_empty() {
        let store = MemoryStore::new();
        assert!(load_conversations(&store).is_empty());
    }

    #[test]
    fn test_load_garbage_returns_empty() {
        let mut store = MemoryStore::new();
        store.set(keys::CONVERSATIONS, "not json").unwrap();
        assert!(load_conversations(&store).is_empty());
    }

    #[test]
    fn test_save_caps_at_maximum() {
        let mut store = MemoryStore::new();
        let conversations: Vec<Conversation> = (0..60)
            .map(|i| conversation_with_message(&format!("message {}", i)))
            .collect();

        save_conversations(&mut store, &conversations);
        let loaded = load_conversations(&store);

        assert_eq!(loaded.len(), MAX_STORED_CONVERSATIONS);
        // Newest-first input order is preserved; the tail is dropped.
        assert_eq!(loaded[0], {
            let mut c = conversations[0].clone();
            c.messages.iter_mut().for_each(|m| m.images = None);
            c
        });
    }

    #[test]
    fn test_save_degrades_to_reduced_cap_when_full() {
        let conversations: Vec<Conversation> = (0..MAX_STORED_CONVERSATIONS)
            .map(|i| conversation_with_message(&format!("message {}", i)))
            .collect();

        // Capacity fits 20 stripped conversations but not 50.
        let fits_20 = serialize_capped(&conversations, REDUCED_STORED_CONVERSATIONS)
            .unwrap()
            .len();
        let fits_50 = serialize_capped(&conversations, MAX_STORED_CONVERSATIONS)
            .unwrap()
            .len();
        assert!(fits_20 < fits_50);
        let mut store = MemoryStore::with_capacity(fits_20);

        save_conversations(&mut store, &conversations);
        assert_eq!(load_conversations(&store).len(), REDUCED_STORED_CONVERSATIONS);
    }

    #[test]
    fn test_save_clears_key_when_even_reduced_set_rejected() {
        let mut store = MemoryStore::with_capacity(4);
        store.set(keys::CONVERSATIONS, "old").unwrap();

        let conversations: Vec<Conversation> = (0..5)
            .map(|i| conversation_with_message(&format!("message {}", i)))
            .collect();
        save_conversations(&mut store, &conversations);

        // Stale data is gone rather than left inconsistent.
        assert!(store.get(keys::CONVERSATIONS).unwrap().is_none());
    }
}
