//! Blocking mailbox session contract.
//!
//! Sessions are driven from `spawn_blocking`, so the trait is synchronous.

use secrecy::SecretString;

use crate::error::MailboxError;

/// Credentials and server for one agency mailbox.
#[derive(Debug, Clone)]
pub struct MailboxAccount {
    /// Login name and agency address of the mailbox.
    pub address: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
}

/// An authenticated session on one mailbox.
pub trait Mailbox: Send {
    /// Select INBOX for searching and fetching.
    fn select_inbox(&mut self) -> Result<(), MailboxError>;

    /// Sequence numbers of messages whose Subject contains `subject`.
    fn search_subject(&mut self, subject: &str) -> Result<Vec<u32>, MailboxError>;

    /// Sequence numbers of messages whose Message-ID, References or
    /// In-Reply-To header mentions `thread_id`.
    fn search_thread(&mut self, thread_id: &str) -> Result<Vec<u32>, MailboxError>;

    /// Full RFC 822 bytes of one message, without changing its flags.
    fn fetch(&mut self, seq: u32) -> Result<Vec<u8>, MailboxError>;

    /// End the session.
    fn logout(&mut self) -> Result<(), MailboxError>;
}

/// Opens authenticated mailbox sessions.
pub trait MailboxConnector: Send + Sync {
    fn connect(&self, account: &MailboxAccount) -> Result<Box<dyn Mailbox>, MailboxError>;
}
