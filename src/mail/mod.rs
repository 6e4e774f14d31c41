//! Mailbox access: the session traits, the rustls IMAP client, an in-memory
//! mailbox, and inbound message parsing.

pub mod imap;
pub mod mailbox;
pub mod memory;
pub mod message;

pub use imap::ImapConnector;
pub use mailbox::{Mailbox, MailboxAccount, MailboxConnector};
pub use memory::MemoryConnector;
pub use message::InboundEmail;
