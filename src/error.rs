//! Error types for the outreach service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse sender configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lead store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox (IMAP) errors. Any of these aborts the pass for one mailbox only.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for mailbox {0}")]
    AuthFailed(String),

    #[error("Command {command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Malformed server response: {0}")]
    Protocol(String),

    #[error("Connection closed by server")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound send validation failures, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid recipient email: {0}")]
    Recipient(String),

    #[error("Invalid subject line: {0:?}")]
    Subject(String),

    #[error("Invalid email content length: {0} chars")]
    Body(usize),

    #[error("Invalid sender configuration for {0}")]
    Sender(String),
}

/// Outbound gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Email sending failed: status {status:?}: {reason}")]
    Delivery { status: Option<u16>, reason: String },

    #[error("No sender configurations available")]
    NoSenders,
}

impl GatewayError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Conversation extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extractor returned no conversation")]
    Empty,

    #[error("Conversation does not match schema: {0}")]
    Schema(String),

    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Content generation errors (scraping, drafting).
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Company domain not found for lead {0}")]
    MissingDomain(String),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Draft could not be parsed: {0}")]
    Draft(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

