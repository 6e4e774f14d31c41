//! In-memory mailboxes (for tests and offline runs).
//!
//! Search semantics follow IMAP: case-insensitive substring match on the
//! Subject, and on the Message-ID, References and In-Reply-To headers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::MailboxError;
use crate::mail::mailbox::{Mailbox, MailboxAccount, MailboxConnector};
use crate::mail::message::InboundEmail;

/// Shared per-mailbox counters, readable after a pass completes.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl SessionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct StoredMailbox {
    messages: Vec<Vec<u8>>,
    fail_search: bool,
    stats: Arc<SessionStats>,
}

/// Connector over a set of in-memory mailboxes keyed by address.
///
/// Unknown addresses fail to authenticate.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    mailboxes: Arc<Mutex<HashMap<String, StoredMailbox>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw message to `address`'s INBOX, creating the mailbox.
    pub fn deliver(&self, address: &str, raw: impl Into<Vec<u8>>) {
        let mut boxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        boxes
            .entry(address.to_ascii_lowercase())
            .or_default()
            .messages
            .push(raw.into());
    }

    /// Make every SEARCH on `address` fail after login.
    pub fn fail_searches(&self, address: &str) {
        let mut boxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        boxes.entry(address.to_ascii_lowercase()).or_default().fail_search = true;
    }

    pub fn stats(&self, address: &str) -> Arc<SessionStats> {
        let mut boxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&boxes.entry(address.to_ascii_lowercase()).or_default().stats)
    }
}

impl MailboxConnector for MemoryConnector {
    fn connect(&self, account: &MailboxAccount) -> Result<Box<dyn Mailbox>, MailboxError> {
        let boxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = boxes.get(&account.address.to_ascii_lowercase()) else {
            return Err(MailboxError::AuthFailed(account.address.clone()));
        };
        stored.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            messages: stored.messages.clone(),
            fail_search: stored.fail_search,
            stats: Arc::clone(&stored.stats),
            selected: false,
        }))
    }
}

struct MemorySession {
    messages: Vec<Vec<u8>>,
    fail_search: bool,
    stats: Arc<SessionStats>,
    selected: bool,
}

impl MemorySession {
    fn search_by(
        &self,
        predicate: impl Fn(&InboundEmail) -> bool,
    ) -> Result<Vec<u32>, MailboxError> {
        if !self.selected {
            return Err(MailboxError::Command {
                command: "SEARCH".into(),
                response: "BAD No mailbox selected".into(),
            });
        }
        if self.fail_search {
            return Err(MailboxError::Command {
                command: "SEARCH".into(),
                response: "NO Server unavailable".into(),
            });
        }
        Ok(self
            .messages
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let seq = idx as u32 + 1;
                InboundEmail::parse(seq, raw)
                    .filter(|email| predicate(email))
                    .map(|_| seq)
            })
            .collect())
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl Mailbox for MemorySession {
    fn select_inbox(&mut self) -> Result<(), MailboxError> {
        self.selected = true;
        Ok(())
    }

    fn search_subject(&mut self, subject: &str) -> Result<Vec<u32>, MailboxError> {
        self.search_by(|email| {
            email
                .subject
                .as_deref()
                .is_some_and(|s| contains_ci(s, subject))
        })
    }

    fn search_thread(&mut self, thread_id: &str) -> Result<Vec<u32>, MailboxError> {
        self.search_by(|email| {
            email.message_id.as_deref().is_some_and(|id| contains_ci(id, thread_id))
                || email.in_reply_to.as_deref().is_some_and(|id| contains_ci(id, thread_id))
                || email.references.iter().any(|id| contains_ci(id, thread_id))
        })
    }

    fn fetch(&mut self, seq: u32) -> Result<Vec<u8>, MailboxError> {
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);
        (seq as usize)
            .checked_sub(1)
            .and_then(|idx| self.messages.get(idx))
            .cloned()
            .ok_or_else(|| MailboxError::Protocol(format!("no message with sequence {seq}")))
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn account(address: &str) -> MailboxAccount {
        MailboxAccount {
            address: address.into(),
            password: SecretString::from("pw"),
            host: "localhost".into(),
            port: 993,
        }
    }

    #[test]
    fn unknown_mailbox_fails_auth() {
        let connector = MemoryConnector::new();
        let err = connector.connect(&account("nobody@agency.com")).err().unwrap();
        assert!(matches!(err, MailboxError::AuthFailed(_)));
    }

    #[test]
    fn subject_search_is_case_insensitive_substring() {
        let connector = MemoryConnector::new();
        connector.deliver("me@agency.com", "Message-ID: <1@x>\r\nSubject: Re: Quick Question\r\n\r\nhi\r\n");
        connector.deliver("me@agency.com", "Message-ID: <2@x>\r\nSubject: Other\r\n\r\nhi\r\n");

        let mut session = connector.connect(&account("me@agency.com")).unwrap();
        session.select_inbox().unwrap();
        assert_eq!(session.search_subject("quick question").unwrap(), vec![1]);
        assert_eq!(session.search_thread("2@x").unwrap(), vec![2]);
        assert!(session.fetch(3).is_err());

        session.logout().unwrap();
        let stats = connector.stats("me@agency.com");
        assert_eq!((stats.opened(), stats.closed(), stats.fetches()), (1, 1, 1));
    }
}
