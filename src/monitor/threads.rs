//! Mailbox scan: correlate inbound messages with outreach leads and expand
//! each match into its full thread.
//!
//! Runs on a blocking thread. Nothing here touches the network beyond the
//! `Mailbox` session it is handed.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::MailboxError;
use crate::gateway::validate::clean_subject;
use crate::leads::Lead;
use crate::mail::mailbox::{Mailbox, MailboxAccount, MailboxConnector};
use crate::mail::message::InboundEmail;

/// Lead email plus the outbound subject used to find replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadTarget {
    pub email: String,
    pub subject: String,
}

impl LeadTarget {
    /// Targets for every lead that has been sent a cold email.
    pub fn from_leads(leads: &[Lead]) -> Vec<Self> {
        leads
            .iter()
            .filter(|lead| lead.has_outbound_subject())
            .map(|lead| Self {
                email: lead.email.clone(),
                subject: clean_subject(&lead.cold_email_subject),
            })
            .collect()
    }
}

/// One conversation thread found for a lead.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub lead_email: String,
    pub thread_id: String,
    /// Thread messages sorted by date, undated first. Never empty.
    pub messages: Vec<InboundEmail>,
}

impl ThreadSnapshot {
    /// The last message in the sorted thread.
    pub fn representative(&self) -> Option<&InboundEmail> {
        self.messages.last()
    }
}

/// Result of scanning one mailbox.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub threads: Vec<ThreadSnapshot>,
    /// Matched messages dropped for lacking a subject or any thread id.
    pub skipped: usize,
}

/// Open a session, scan it, and log out whatever the scan's outcome.
pub fn scan_mailbox(
    connector: &dyn MailboxConnector,
    account: &MailboxAccount,
    targets: &[LeadTarget],
) -> Result<ScanOutcome, MailboxError> {
    let mut mailbox = connector.connect(account)?;

    let result = mailbox
        .select_inbox()
        .and_then(|()| collect_threads(mailbox.as_mut(), targets));

    if let Err(e) = mailbox.logout() {
        warn!(mailbox = %account.address, error = %e, "Mailbox logout failed");
    }
    result
}

/// Find every reply thread for `targets` in the selected mailbox.
///
/// Matches are processed newest first. A thread goes to the first lead
/// found among its participants and is reported once.
pub fn collect_threads(
    mailbox: &mut dyn Mailbox,
    targets: &[LeadTarget],
) -> Result<ScanOutcome, MailboxError> {
    let mut cache = MessageCache::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut outcome = ScanOutcome::default();

    for target in targets {
        if target.subject.is_empty() {
            continue;
        }

        let mut matches = mailbox.search_subject(&target.subject)?;
        matches.sort_unstable_by(|a, b| b.cmp(a));
        debug!(lead = %target.email, matches = matches.len(), "Subject search");

        for seq in matches {
            let Some(email) = cache.get(mailbox, seq)? else {
                outcome.skipped += 1;
                continue;
            };
            if email.subject.is_none() {
                outcome.skipped += 1;
                continue;
            }
            let Some(thread_id) = email.thread_id() else {
                debug!(seq, "Message has no thread identifier");
                outcome.skipped += 1;
                continue;
            };

            if seen.contains(&thread_id) {
                continue;
            }

            let messages = expand_thread(mailbox, &mut cache, email, &thread_id)?;
            let participants: HashSet<String> =
                messages.iter().flat_map(InboundEmail::participants).collect();
            debug!(seq, thread = %thread_id, ?participants, "Matched message");

            // Subject search matches substrings, so another lead's thread can surface here.
            if !participants.contains(&target.email.trim().to_ascii_lowercase()) {
                debug!(lead = %target.email, thread = %thread_id, "Lead not in thread");
                continue;
            }

            seen.insert(thread_id.clone());
            outcome.threads.push(ThreadSnapshot {
                lead_email: target.email.clone(),
                thread_id,
                messages,
            });
        }
    }

    Ok(outcome)
}

/// All messages of `thread_id`, sorted by date with undated ones first.
fn expand_thread(
    mailbox: &mut dyn Mailbox,
    cache: &mut MessageCache,
    matched: InboundEmail,
    thread_id: &str,
) -> Result<Vec<InboundEmail>, MailboxError> {
    let seqs = mailbox.search_thread(thread_id)?;

    let mut messages = Vec::with_capacity(seqs.len() + 1);
    for seq in seqs {
        if let Some(email) = cache.get(mailbox, seq)? {
            messages.push(email);
        }
    }
    if !messages.iter().any(|m| m.seq == matched.seq) {
        messages.push(matched);
    }

    messages.sort_by_key(|m| (m.date, m.seq));
    Ok(messages)
}

/// Parsed messages by sequence number, so a message is fetched once per scan.
#[derive(Default)]
struct MessageCache {
    parsed: HashMap<u32, Option<InboundEmail>>,
}

impl MessageCache {
    fn get(
        &mut self,
        mailbox: &mut dyn Mailbox,
        seq: u32,
    ) -> Result<Option<InboundEmail>, MailboxError> {
        if let Some(hit) = self.parsed.get(&seq) {
            return Ok(hit.clone());
        }
        let raw = mailbox.fetch(seq)?;
        let email = InboundEmail::parse(seq, &raw);
        if email.is_none() {
            warn!(seq, "Could not parse message");
        }
        self.parsed.insert(seq, email.clone());
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::memory::MemoryConnector;
    use secrecy::SecretString;

    const MAILBOX: &str = "krishna@agency.com";

    fn account() -> MailboxAccount {
        MailboxAccount {
            address: MAILBOX.into(),
            password: SecretString::from("pw"),
            host: "localhost".into(),
            port: 993,
        }
    }

    fn target(email: &str, subject: &str) -> LeadTarget {
        LeadTarget {
            email: email.into(),
            subject: subject.into(),
        }
    }

    fn message(id: &str, refs: &str, subject: &str, date: &str, body: &str) -> String {
        let mut raw = format!("Message-ID: <{id}>\r\n");
        if !refs.is_empty() {
            raw.push_str(&format!("In-Reply-To: <{refs}>\r\nReferences: <{refs}>\r\n"));
        }
        raw.push_str(&format!("From: a@x.com\r\nTo: {MAILBOX}\r\nSubject: {subject}\r\n"));
        if !date.is_empty() {
            raw.push_str(&format!("Date: {date}\r\n"));
        }
        raw.push_str(&format!("\r\n{body}\r\n"));
        raw
    }

    #[test]
    fn thread_is_expanded_and_sorted() {
        let connector = MemoryConnector::new();
        connector.deliver(
            MAILBOX,
            message("t2@x.com", "t1@agency.com", "Re: Quick question, X Corp", "Wed, 01 May 2024 12:00:00 +0000", "Sounds good"),
        );
        connector.deliver(
            MAILBOX,
            message("t1@agency.com", "", "Quick question, X Corp", "Tue, 30 Apr 2024 09:00:00 +0000", "Hi Ada"),
        );

        let outcome = scan_mailbox(
            &connector,
            &account(),
            &[target("a@x.com", "Quick question, X Corp")],
        )
        .unwrap();

        assert_eq!(outcome.threads.len(), 1);
        let thread = &outcome.threads[0];
        assert_eq!(thread.thread_id, "t1@agency.com");
        let ids: Vec<_> = thread.messages.iter().map(|m| m.message_id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["t1@agency.com", "t2@x.com"]);
        assert_eq!(
            thread.representative().unwrap().message_id.as_deref(),
            Some("t2@x.com")
        );
        assert_eq!(connector.stats(MAILBOX).closed(), 1);
    }

    #[test]
    fn each_thread_is_processed_once() {
        let connector = MemoryConnector::new();
        for (id, date) in [("r1@x.com", "Wed, 01 May 2024 12:00:00 +0000"), ("r2@x.com", "Thu, 02 May 2024 12:00:00 +0000")] {
            connector.deliver(MAILBOX, message(id, "root@agency.com", "Re: Hello", date, "reply"));
        }

        let outcome = scan_mailbox(&connector, &account(), &[target("a@x.com", "Hello")]).unwrap();
        assert_eq!(outcome.threads.len(), 1);
        assert_eq!(outcome.threads[0].messages.len(), 2);
    }

    #[test]
    fn undated_messages_sort_first() {
        let connector = MemoryConnector::new();
        connector.deliver(MAILBOX, message("r1@x.com", "root@agency.com", "Re: Hello", "Wed, 01 May 2024 12:00:00 +0000", "dated"));
        connector.deliver(MAILBOX, message("r2@x.com", "root@agency.com", "Re: Hello", "", "undated"));

        let outcome = scan_mailbox(&connector, &account(), &[target("a@x.com", "Hello")]).unwrap();
        let thread = &outcome.threads[0];
        assert!(thread.messages[0].date.is_none());
        assert_eq!(thread.representative().unwrap().message_id.as_deref(), Some("r1@x.com"));
    }

    #[test]
    fn messages_without_ids_are_skipped() {
        let connector = MemoryConnector::new();
        connector.deliver(MAILBOX, "From: a@x.com\r\nSubject: Re: Hello\r\n\r\nno ids\r\n");

        let outcome = scan_mailbox(&connector, &account(), &[target("a@x.com", "Hello")]).unwrap();
        assert!(outcome.threads.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn empty_subject_targets_are_ignored() {
        let connector = MemoryConnector::new();
        connector.deliver(MAILBOX, message("r1@x.com", "", "Anything", "", "body"));

        let outcome = scan_mailbox(&connector, &account(), &[target("a@x.com", "")]).unwrap();
        assert!(outcome.threads.is_empty());
        assert_eq!(connector.stats(MAILBOX).fetches(), 0);
    }

    #[test]
    fn session_is_closed_when_scan_fails() {
        let connector = MemoryConnector::new();
        connector.deliver(MAILBOX, message("r1@x.com", "", "Hello", "", "body"));
        connector.fail_searches(MAILBOX);

        let result = scan_mailbox(&connector, &account(), &[target("a@x.com", "Hello")]);
        assert!(result.is_err());
        assert_eq!(connector.stats(MAILBOX).closed(), 1);
    }

    #[test]
    fn thread_goes_to_the_lead_who_is_in_it() {
        let connector = MemoryConnector::new();
        connector.deliver(
            MAILBOX,
            "Message-ID: <b1@y.com>\r\nIn-Reply-To: <root@agency.com>\r\nReferences: <root@agency.com>\r\n\
             From: Bob <b@y.com>\r\nTo: krishna@agency.com\r\nSubject: Re: Hello Bob\r\n\
             Date: Wed, 01 May 2024 12:00:00 +0000\r\n\r\nHi back\r\n",
        );

        let targets = [target("a@x.com", "Hello"), target("B@y.com", "Hello Bob")];
        let outcome = scan_mailbox(&connector, &account(), &targets).unwrap();

        assert_eq!(outcome.threads.len(), 1);
        assert_eq!(outcome.threads[0].lead_email, "B@y.com");
        assert_eq!(outcome.threads[0].thread_id, "root@agency.com");
    }

    #[test]
    fn thread_without_the_lead_is_not_claimed() {
        let connector = MemoryConnector::new();
        connector.deliver(
            MAILBOX,
            "Message-ID: <n1@news.com>\r\nFrom: news@news.com\r\nTo: krishna@agency.com\r\n\
             Subject: Hello from the newsletter\r\n\r\nHeadlines\r\n",
        );

        let outcome = scan_mailbox(&connector, &account(), &[target("a@x.com", "Hello")]).unwrap();
        assert!(outcome.threads.is_empty());
    }

    #[test]
    fn targets_come_from_leads_with_subjects() {
        let mut sent = Lead::new("a@x.com", "Ada");
        sent.cold_email_subject = " \"Quick question\" ".into();
        let unsent = Lead::new("b@x.com", "Bob");

        assert_eq!(
            LeadTarget::from_leads(&[sent, unsent]),
            vec![target("a@x.com", "Quick question")]
        );
    }
}
