//! Provider-neutral completion types and the `LlmProvider` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-style prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single-shot completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// System messages joined as the preamble, everything else as the prompt.
    pub fn split_prompt(&self) -> (Option<String>, String) {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let prompt: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
        (preamble, prompt.join("\n\n"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
}

/// A text-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_prompt_separates_system_messages() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("Hello"),
            ChatMessage::system("Answer in JSON."),
        ])
        .with_temperature(0.3)
        .with_max_tokens(150);

        let (preamble, prompt) = request.split_prompt();
        assert_eq!(preamble.as_deref(), Some("You are terse.\n\nAnswer in JSON."));
        assert_eq!(prompt, "Hello");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(150));
    }

    #[test]
    fn split_prompt_without_system() {
        let (preamble, prompt) = CompletionRequest::new(vec![ChatMessage::user("Hi")]).split_prompt();
        assert!(preamble.is_none());
        assert_eq!(prompt, "Hi");
    }
}
