//! Conversation Persistence
//!
//! Authenticated chat turns are stored so that later turns can send the
//! recent history to the provider as context. Guest turns are never stored.
//!
//! The [`ConversationStore`] trait is the seam for a real database; the
//! in-memory implementation backs the server by default and the tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Types
// ============================================================================

/// Author of a stored message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person chatting
    User,
    /// The model
    Assistant,
}

impl MessageRole {
    /// Role name as the providers spell it
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A stored chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message identifier
    pub id: Uuid,
    /// Author
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// When the message was stored
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Conversation metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier
    pub id: Uuid,
    /// Opaque identifier of the owning user
    pub user_id: String,
    /// Display title
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last stored message
    pub updated_at: DateTime<Utc>,
}

/// Conversation store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No conversation with this id
    #[error("Conversation not found: {0}")]
    NotFound(Uuid),

    /// The backing store failed
    #[error("Conversation store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence for conversations and their messages
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the requested conversation if it exists and belongs to
    /// `user_id`, otherwise create a new one for that user
    async fn get_or_create(
        &self,
        user_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, StoreError>;

    /// All messages of a conversation, oldest first
    async fn fetch_messages(&self, conversation_id: Uuid)
        -> Result<Vec<ConversationMessage>, StoreError>;

    /// Append a message
    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ConversationMessage, StoreError>;

    /// Conversations of a user, most recently updated first
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug)]
struct StoredConversation {
    meta: Conversation,
    messages: Vec<ConversationMessage>,
}

/// Process-local conversation store
#[derive(Clone, Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<DashMap<Uuid, StoredConversation>>,
}

impl InMemoryConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store holds no conversations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

fn default_title(now: DateTime<Utc>) -> String {
    format!("Conversation {}", now.format("%d/%m %H:%M"))
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create(
        &self,
        user_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, StoreError> {
        if let Some(id) = conversation_id {
            if let Some(existing) = self.conversations.get(&id) {
                if existing.meta.user_id == user_id {
                    return Ok(existing.meta.clone());
                }
                tracing::warn!(conversation_id = %id, "Conversation belongs to another user, starting a new one");
            }
        }

        let now = Utc::now();
        let meta = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: default_title(now),
            created_at: now,
            updated_at: now,
        };
        self.conversations.insert(
            meta.id,
            StoredConversation {
                meta: meta.clone(),
                messages: Vec::new(),
            },
        );
        tracing::debug!(conversation_id = %meta.id, "Created conversation");
        Ok(meta)
    }

    async fn fetch_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        self.conversations
            .get(&conversation_id)
            .map(|c| c.messages.clone())
            .ok_or(StoreError::NotFound(conversation_id))
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ConversationMessage, StoreError> {
        let mut entry = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(StoreError::NotFound(conversation_id))?;

        let message = ConversationMessage::new(role, content);
        entry.meta.updated_at = message.created_at;
        entry.messages.push(message.clone());
        Ok(message)
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.meta.user_id == user_id)
            .map(|c| c.meta.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reuses_owned_conversation() {
        let store = InMemoryConversationStore::new();

        let first = tokio_test::assert_ok!(store.get_or_create("user-1", None).await);
        assert!(first.title.starts_with("Conversation "));

        let again = store.get_or_create("user-1", Some(first.id)).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_id_creates_new_conversation() {
        let store = InMemoryConversationStore::new();
        let owned = store.get_or_create("user-1", None).await.unwrap();

        let unknown = store
            .get_or_create("user-1", Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert_ne!(unknown.id, owned.id);

        let foreign = store.get_or_create("user-2", Some(owned.id)).await.unwrap();
        assert_ne!(foreign.id, owned.id);
        assert_eq!(foreign.user_id, "user-2");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_messages_are_kept_in_order() {
        let store = InMemoryConversationStore::new();
        let conversation = store.get_or_create("user-1", None).await.unwrap();

        store
            .create_message(conversation.id, MessageRole::User, "Hi")
            .await
            .unwrap();
        store
            .create_message(conversation.id, MessageRole::Assistant, "Hello!")
            .await
            .unwrap();

        let messages = store.fetch_messages(conversation.id).await.unwrap();
        let contents: Vec<_> = messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            contents,
            vec![(MessageRole::User, "Hi"), (MessageRole::Assistant, "Hello!")]
        );
    }

    #[tokio::test]
    async fn test_missing_conversation() {
        let store = InMemoryConversationStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            store.fetch_messages(id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
        let err = tokio_test::assert_err!(store.create_message(id, MessageRole::User, "x").await);
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_conversations_filters_by_user() {
        let store = InMemoryConversationStore::new();
        let a = store.get_or_create("user-1", None).await.unwrap();
        let b = store.get_or_create("user-1", None).await.unwrap();
        store.get_or_create("user-2", None).await.unwrap();

        store
            .create_message(a.id, MessageRole::User, "latest")
            .await
            .unwrap();

        let listed = store.list_conversations("user-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|c| c.id == b.id));
        assert_eq!(listed[0].id, a.id);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(MessageRole::User.as_str(), "user");
    }
}
