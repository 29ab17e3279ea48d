//! Conversational relay: forwards chat messages to a hosted assistant and
//! hands the replies back in transport-sized pieces.

pub mod assistant;
pub mod openai;
pub mod store;
pub mod tools;

use std::sync::Arc;

use tracing::{error, info};

pub use assistant::{AssistantBackend, AssistantError, AssistantReply, FunctionCall};
pub use openai::{OpenAiAssistant, OpenAiClient};
pub use store::{ConversationStore, InMemoryConversationStore};
pub use tools::ToolRegistry;

/// Largest reply chunk sent as a single chat message.
pub const MAX_CHUNK_CHARS: usize = 4000;

/// Sent instead of a reply when anything goes wrong.
pub const FAILURE_REPLY: &str =
    "Sorry, I encountered an error while processing your message. Please try again.";

pub struct Relay {
    backend: Arc<dyn AssistantBackend>,
    store: Arc<dyn ConversationStore>,
}

impl Relay {
    pub fn new(backend: Arc<dyn AssistantBackend>, store: Arc<dyn ConversationStore>) -> Self {
        Self { backend, store }
    }

    /// Forward `text` from `chat_id` and return the reply chunks.
    ///
    /// Never fails: errors are logged and answered with [`FAILURE_REPLY`].
    pub async fn handle_text(&self, chat_id: i64, text: &str) -> Vec<String> {
        match self.converse(chat_id, text).await {
            Ok(reply) => {
                if !reply.function_calls.is_empty() {
                    let names: Vec<&str> =
                        reply.function_calls.iter().map(|c| c.name.as_str()).collect();
                    info!(chat_id, functions = ?names, "functions called");
                }
                split_message(&reply.content, MAX_CHUNK_CHARS)
            }
            Err(err) => {
                error!(chat_id, error = %err, "failed to relay message");
                vec![FAILURE_REPLY.to_owned()]
            }
        }
    }

    /// Forget the chat's conversation so the next message opens a new one.
    pub async fn reset(&self, chat_id: i64) -> bool {
        let existed = self.store.remove(chat_id).await;
        info!(chat_id, existed, "conversation reset");
        existed
    }

    async fn converse(&self, chat_id: i64, text: &str) -> Result<AssistantReply, AssistantError> {
        if text.trim().is_empty() {
            return Err(AssistantError::EmptyMessage);
        }

        let thread_id = match self.store.get(chat_id).await {
            Some(thread_id) => thread_id,
            None => {
                let thread_id = self.backend.create_thread().await?;
                self.store.put(chat_id, thread_id.clone()).await;
                info!(chat_id, %thread_id, "conversation started");
                thread_id
            }
        };

        let reply = self.backend.send(&thread_id, text).await?;
        if reply.content.trim().is_empty() {
            return Err(AssistantError::EmptyReply(reply.thread_id));
        }
        Ok(reply)
    }
}

/// Split `text` into pieces of at most `max_chars` characters, never
/// cutting inside a character. Empty text gives no pieces.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_owned());
        rest = tail;
    }
    chunks
}
