// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pluggable secret and conversation persistence. The core depends only on
//! these traits; concrete backends (OS keychain, SQLite) live outside this
//! crate. Reference implementations here back the demo binary and tests.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sven_model::Role;
use uuid::Uuid;

/// Abstract key-value mapping for provider API keys and other secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;
    async fn set(&self, name: &str, value: &str);
    async fn delete(&self, name: &str);
    async fn has(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }
}

/// Secrets read from `SVEN_SECRET_<NAME>` environment variables. `set`/`delete`
/// only affect this process's in-memory overlay, not the real environment.
#[derive(Default)]
pub struct EnvSecretStore {
    overlay: Mutex<HashMap<String, Option<String>>>,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn env_key(name: &str) -> String {
        format!("SVEN_SECRET_{}", name.to_uppercase())
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, name: &str) -> Option<String> {
        if let Some(overridden) = self.overlay.lock().unwrap().get(name) {
            return overridden.clone();
        }
        std::env::var(Self::env_key(name)).ok()
    }

    async fn set(&self, name: &str, value: &str) {
        self.overlay.lock().unwrap().insert(name.to_string(), Some(value.to_string()));
    }

    async fn delete(&self, name: &str) {
        self.overlay.lock().unwrap().insert(name.to_string(), None);
    }
}

// ─── Conversation store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_pinned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata_json: Option<String>,
}

impl StoredMessage {
    pub fn role_enum(&self) -> Role {
        match self.role.as_str() {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, title: &str) -> Conversation;
    async fn get_conversation(&self, id: &str) -> Option<Conversation>;
    async fn list_conversations(&self) -> Vec<Conversation>;
    async fn delete_conversation(&self, id: &str);

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        model: Option<&str>,
    ) -> StoredMessage;
    /// Overwrite an existing message's content in place (used to finalize a
    /// streamed assistant placeholder).
    async fn update_message_content(&self, message_id: &str, content: &str);
    async fn list_messages(&self, conversation_id: &str) -> Vec<StoredMessage>;
}

/// `Vec`/`HashMap`-behind-`Mutex` reference implementation for tests and the
/// demo binary.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, title: &str) -> Conversation {
        let now = Utc::now();
        let conv = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            is_pinned: false,
        };
        let mut state = self.inner.lock().unwrap();
        state.messages.insert(conv.id.clone(), Vec::new());
        state.conversations.insert(conv.id.clone(), conv.clone());
        conv
    }

    async fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.lock().unwrap().conversations.get(id).cloned()
    }

    async fn list_conversations(&self) -> Vec<Conversation> {
        let mut convs: Vec<Conversation> = self.inner.lock().unwrap().conversations.values().cloned().collect();
        convs.sort_by_key(|c| c.created_at);
        convs
    }

    async fn delete_conversation(&self, id: &str) {
        let mut state = self.inner.lock().unwrap();
        state.conversations.remove(id);
        state.messages.remove(id);
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        model: Option<&str>,
    ) -> StoredMessage {
        let msg = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            model: model.map(str::to_string),
            created_at: Utc::now(),
            metadata_json: None,
        };
        let mut state = self.inner.lock().unwrap();
        state.messages.entry(conversation_id.to_string()).or_default().push(msg.clone());
        if let Some(conv) = state.conversations.get_mut(conversation_id) {
            conv.updated_at = msg.created_at;
        }
        msg
    }

    async fn update_message_content(&self, message_id: &str, content: &str) {
        let mut state = self.inner.lock().unwrap();
        for messages in state.messages.values_mut() {
            if let Some(m) = messages.iter_mut().find(|m| m.id == message_id) {
                m.content = content.to_string();
                return;
            }
        }
    }

    async fn list_messages(&self, conversation_id: &str) -> Vec<StoredMessage> {
        self.inner.lock().unwrap().messages.get(conversation_id).cloned().unwrap_or_default()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_secret_store_reads_from_environment() {
        std::env::set_var("SVEN_SECRET_TESTKEY", "topsecret");
        let store = EnvSecretStore::new();
        assert_eq!(store.get("testkey").await.as_deref(), Some("topsecret"));
        std::env::remove_var("SVEN_SECRET_TESTKEY");
    }

    #[tokio::test]
    async fn env_secret_store_set_overlays_without_touching_environment() {
        let store = EnvSecretStore::new();
        store.set("ephemeral", "value").await;
        assert_eq!(store.get("ephemeral").await.as_deref(), Some("value"));
        assert!(std::env::var("SVEN_SECRET_EPHEMERAL").is_err());
    }

    #[tokio::test]
    async fn env_secret_store_delete_clears_overlay() {
        let store = EnvSecretStore::new();
        store.set("k", "v").await;
        store.delete("k").await;
        assert!(!store.has("k").await);
    }

    #[tokio::test]
    async fn conversation_store_roundtrips_messages() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation("test").await;
        store.append_message(&conv.id, "user", "hello", None).await;
        let asst = store.append_message(&conv.id, "assistant", "", Some("gpt")).await;
        store.update_message_content(&asst.id, "hi there").await;

        let messages = store.list_messages(&conv.id).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn list_conversations_is_ordered_by_creation() {
        let store = InMemoryConversationStore::new();
        let a = store.create_conversation("a").await;
        let b = store.create_conversation("b").await;
        let listed = store.list_conversations().await;
        assert_eq!(listed.iter().map(|c| c.id.clone()).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn delete_conversation_removes_its_messages() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation("doomed").await;
        store.append_message(&conv.id, "user", "x", None).await;
        store.delete_conversation(&conv.id).await;
        assert!(store.get_conversation(&conv.id).await.is_none());
        assert!(store.list_messages(&conv.id).await.is_empty());
    }
}
