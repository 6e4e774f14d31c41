//! Turning a thread snapshot into a timestamped conversation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::leads::conversation::{normalize_timestamp, timestamp_key};
use crate::leads::{Conversation, ConversationEntry};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::mail::message::strip_quoted_text;
use crate::monitor::threads::ThreadSnapshot;

/// Produces a conversation mapping from one thread.
#[async_trait]
pub trait ConversationExtractor: Send + Sync {
    async fn extract(&self, thread: &ThreadSnapshot) -> Result<Conversation, ExtractionError>;
}

/// Builds entries straight from the thread's headers and bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderConversationExtractor;

#[async_trait]
impl ConversationExtractor for HeaderConversationExtractor {
    async fn extract(&self, thread: &ThreadSnapshot) -> Result<Conversation, ExtractionError> {
        let mut conversation = Conversation::new();
        for message in &thread.messages {
            let (Some(date), Some(sender)) = (message.date, message.from.as_deref()) else {
                debug!(thread = %thread.thread_id, seq = message.seq, "Message lacks Date or From");
                continue;
            };
            let body = strip_quoted_text(&message.body);
            if body.trim().is_empty() {
                continue;
            }
            conversation.insert(timestamp_key(date), ConversationEntry::new(sender, body));
        }

        if conversation.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(conversation)
    }
}

/// Asks a language model to reconstruct the conversation from the
/// representative message, which usually quotes the earlier ones.
pub struct LlmConversationExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl LlmConversationExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

fn extraction_prompt(email_body: &str) -> String {
    format!(
        "Extract the email conversation and format it as a JSON dictionary of dictionaries where:\n\
         The outer dictionary has keys as the timestamp of the message and values as dictionary with the following keys:\n\
         - sender: the sender's email address\n\
         - message: the actual message\n\n\
         For the key timestamp in outer dictionary, use the timestamp of the message in ISO format (YYYY-MM-DD HH:MM:SS) with the time zone\n\
         Remove any duplicate messages\n\
         Maintain chronological order\n\
         Maintain new line characters in the message\n\
         Include the actual conversation content and all replies\n\n\
         Email body:\n{email_body}\n\n\
         Return ONLY a valid JSON dictionary of dictionaries with the conversation.\n\
         Remember, keys and values must be enclosed in double quotes."
    )
}

#[async_trait]
impl ConversationExtractor for LlmConversationExtractor {
    async fn extract(&self, thread: &ThreadSnapshot) -> Result<Conversation, ExtractionError> {
        let representative = thread.representative().ok_or(ExtractionError::Empty)?;

        let mut body = String::new();
        if let Some(from) = &representative.from {
            body.push_str(&format!("From: {from}\n"));
        }
        if let Some(date) = representative.date {
            body.push_str(&format!("Date: {}\n", date.to_rfc3339()));
        }
        body.push('\n');
        body.push_str(&representative.body);

        let request = CompletionRequest::new(vec![ChatMessage::user(extraction_prompt(&body))])
            .with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let conversation = parse_conversation(&response.content)?;
        debug!(
            thread = %thread.thread_id,
            entries = conversation.len(),
            "Conversation extracted"
        );
        Ok(conversation)
    }
}

/// Validate model output against the conversation schema.
///
/// The output must be one JSON object of `{timestamp: {sender, message}}`.
/// Entries whose timestamp cannot be parsed are dropped; any other shape
/// violation rejects the whole output.
pub fn parse_conversation(raw: &str) -> Result<Conversation, ExtractionError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ExtractionError::Schema("no JSON object in output".into()))?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ExtractionError::Schema(e.to_string()))?;
    let serde_json::Value::Object(entries) = value else {
        return Err(ExtractionError::Schema("top level is not an object".into()));
    };

    let mut conversation = Conversation::new();
    for (timestamp, entry) in entries {
        let sender = entry.get("sender").and_then(|v| v.as_str());
        let message = entry.get("message").and_then(|v| v.as_str());
        let (Some(sender), Some(message)) = (sender, message) else {
            return Err(ExtractionError::Schema(format!(
                "entry '{timestamp}' needs string 'sender' and 'message'"
            )));
        };

        let Some(key) = normalize_timestamp(&timestamp) else {
            warn!(timestamp = %timestamp, "Dropping conversation entry with unparseable timestamp");
            continue;
        };
        conversation.insert(key, ConversationEntry::new(sender, message));
    }

    if conversation.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(conversation)
}
