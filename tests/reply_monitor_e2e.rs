//! End-to-end reply monitoring: in-memory mailboxes, in-memory libSQL store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;

use outreach_assist::config::MonitorConfig;
use outreach_assist::error::LlmError;
use outreach_assist::gateway::{SenderConfigStore, SenderIdentity};
use outreach_assist::leads::{Conversation, EmailStatus, Lead};
use outreach_assist::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use outreach_assist::mail::{MailboxAccount, MemoryConnector};
use outreach_assist::monitor::{
    ConversationExtractor, HeaderConversationExtractor, LlmConversationExtractor, ReplyMonitor,
};
use outreach_assist::scheduler::ReplyScheduler;
use outreach_assist::store::{LeadStore, LibSqlLeadStore};

const MAILBOX: &str = "krishna@kuberanix.com";
const SUBJECT: &str = "Quick question, X Corp";

// ── Helpers ─────────────────────────────────────────────────────────────

fn account(address: &str) -> MailboxAccount {
    MailboxAccount {
        address: address.into(),
        password: SecretString::from("pw"),
        host: "localhost".into(),
        port: 993,
    }
}

fn sender(email: &str) -> SenderIdentity {
    SenderIdentity {
        email: email.into(),
        display_name: "Krishna".into(),
        password: SecretString::from("pw"),
        api_key: SecretString::from("re_key"),
    }
}

fn first_touch() -> String {
    format!(
        "Message-ID: <root@kuberanix.com>\r\n\
         From: Krishna <{MAILBOX}>\r\n\
         To: Ada Lovelace <a@x.com>\r\n\
         Subject: {SUBJECT}\r\n\
         Date: Wed, 01 May 2024 10:00:00 +0000\r\n\
         \r\n\
         Hi Ada,\r\n\r\nWould you be open to a quick chat?\r\n"
    )
}

fn client_reply() -> String {
    format!(
        "Message-ID: <r1@x.com>\r\n\
         In-Reply-To: <root@kuberanix.com>\r\n\
         References: <root@kuberanix.com>\r\n\
         From: Ada Lovelace <a@x.com>\r\n\
         To: {MAILBOX}\r\n\
         Cc: cto@x.com\r\n\
         Subject: Re: {SUBJECT}\r\n\
         Date: Wed, 01 May 2024 12:00:00 +0000\r\n\
         \r\n\
         Sounds interesting, let's talk.\r\n\
         \r\n\
         On Wed, 1 May 2024 at 10:00, Krishna wrote:\r\n\
         > Hi Ada,\r\n"
    )
}

async fn store_with_leads() -> Arc<LibSqlLeadStore> {
    let store = LibSqlLeadStore::new_memory().await.unwrap();

    let mut contacted = Lead::new("a@x.com", "Ada Lovelace");
    contacted.company_name = "X Corp".into();
    contacted.cold_email_subject = SUBJECT.into();
    contacted.email_status = EmailStatus::Sent;
    contacted.sender_email = MAILBOX.into();
    store.insert_lead(&contacted).await.unwrap();

    let untouched = Lead::new("b@y.com", "Bob Builder");
    store.insert_lead(&untouched).await.unwrap();

    Arc::new(store)
}

fn monitor(
    connector: &MemoryConnector,
    extractor: Arc<dyn ConversationExtractor>,
    store: Arc<LibSqlLeadStore>,
) -> ReplyMonitor {
    ReplyMonitor::new(Arc::new(connector.clone()), extractor, store)
}

/// Replies with a fixed conversation and counts calls.
struct StubLlm {
    reply: String,
    calls: Mutex<usize>,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        *self.calls.lock().unwrap() += 1;
        Ok(CompletionResponse {
            content: self.reply.clone(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn client_reply_marks_lead_replied() {
    let connector = MemoryConnector::new();
    connector.deliver(MAILBOX, first_touch());
    connector.deliver(MAILBOX, client_reply());
    let store = store_with_leads().await;

    let leads = store.get_all_leads().await.unwrap();
    let report = monitor(&connector, Arc::new(HeaderConversationExtractor), Arc::clone(&store))
        .check_mailbox(account(MAILBOX), &leads)
        .await
        .unwrap();

    // Both messages share the root id, so there is one thread.
    assert_eq!(report.threads_found, 1);
    assert_eq!(report.threads_processed, 1);
    assert_eq!(report.leads_updated, 1);

    let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
    assert_eq!(lead.email_status, EmailStatus::Replied);
    assert_eq!(lead.last_sender, "Client");
    assert_eq!(lead.last_message, "Sounds interesting, let's talk.");

    let history = Conversation::from_stored(&lead.conversation_history).unwrap();
    let entries = history.chronological();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "2024-05-01T10:00:00Z");
    assert_eq!(entries[0].1.sender, MAILBOX);
    assert_eq!(entries[1].0, "2024-05-01T12:00:00Z");
    assert_eq!(entries[1].1.sender, "a@x.com");

    let untouched = store.get_lead("b@y.com").await.unwrap().unwrap();
    assert_eq!(untouched.email_status, EmailStatus::New);
    assert!(untouched.conversation_history.is_empty());

    assert_eq!(connector.stats(MAILBOX).opened(), 1);
    assert_eq!(connector.stats(MAILBOX).closed(), 1);
}

#[tokio::test]
async fn repeated_pass_does_not_duplicate_history() {
    let connector = MemoryConnector::new();
    connector.deliver(MAILBOX, first_touch());
    connector.deliver(MAILBOX, client_reply());
    let store = store_with_leads().await;
    let monitor = monitor(&connector, Arc::new(HeaderConversationExtractor), Arc::clone(&store));

    for _ in 0..2 {
        let leads = store.get_all_leads().await.unwrap();
        monitor.check_mailbox(account(MAILBOX), &leads).await.unwrap();
    }

    let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
    let history = Conversation::from_stored(&lead.conversation_history).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(lead.email_status, EmailStatus::Replied);
}

#[tokio::test]
async fn unrelated_mail_is_ignored() {
    let connector = MemoryConnector::new();
    connector.deliver(
        MAILBOX,
        "Message-ID: <n1@news.com>\r\nFrom: news@news.com\r\nSubject: Weekly digest\r\n\
         Date: Wed, 01 May 2024 09:00:00 +0000\r\n\r\nHeadlines\r\n",
    );
    let store = store_with_leads().await;

    let leads = store.get_all_leads().await.unwrap();
    let report = monitor(&connector, Arc::new(HeaderConversationExtractor), Arc::clone(&store))
        .check_mailbox(account(MAILBOX), &leads)
        .await
        .unwrap();

    assert_eq!(report.threads_found, 0);
    assert_eq!(report.leads_updated, 0);
    let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
    assert_eq!(lead.email_status, EmailStatus::Sent);
}

#[tokio::test]
async fn model_extraction_normalises_timestamps() {
    let connector = MemoryConnector::new();
    connector.deliver(MAILBOX, client_reply());
    let store = store_with_leads().await;

    let llm = Arc::new(StubLlm {
        reply: format!(
            "```json\n{{\n  \"2024-05-01 10:00:00+00:00\": {{\"sender\": \"{MAILBOX}\", \"message\": \"Hi Ada,\"}},\n  \
             \"2024-05-01 12:00:00+00:00\": {{\"sender\": \"a@x.com\", \"message\": \"Sounds interesting, let's talk.\"}}\n}}\n```"
        ),
        calls: Mutex::new(0),
    });
    let extractor = Arc::new(LlmConversationExtractor::new(llm.clone()));

    let leads = store.get_all_leads().await.unwrap();
    monitor(&connector, extractor, Arc::clone(&store))
        .check_mailbox(account(MAILBOX), &leads)
        .await
        .unwrap();
    assert_eq!(*llm.calls.lock().unwrap(), 1);

    let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
    let history = Conversation::from_stored(&lead.conversation_history).unwrap();
    assert!(history.get("2024-05-01T10:00:00Z").is_some());
    assert!(history.get("2024-05-01T12:00:00Z").is_some());
    assert_eq!(lead.last_sender, "Client");
}

#[tokio::test]
async fn scheduler_isolates_failing_mailboxes() {
    let connector = MemoryConnector::new();
    connector.deliver(MAILBOX, first_touch());
    connector.deliver(MAILBOX, client_reply());
    let store = store_with_leads().await;

    // ghost@ has no mailbox in the connector, so its login fails.
    let senders = Arc::new(SenderConfigStore::from_senders(vec![
        sender("ghost@kuberanix.com"),
        sender(MAILBOX),
    ]));
    let monitor = Arc::new(monitor(
        &connector,
        Arc::new(HeaderConversationExtractor),
        Arc::clone(&store),
    ));
    let scheduler = ReplyScheduler::new(
        monitor,
        senders,
        store.clone(),
        MonitorConfig::default(),
    );

    let outcomes = scheduler.check_all_mailboxes().await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].mailbox, "ghost@kuberanix.com");
    assert!(outcomes[0].error.is_some());
    assert_eq!(outcomes[1].mailbox, MAILBOX);
    assert_eq!(outcomes[1].report.as_ref().unwrap().leads_updated, 1);

    let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
    assert_eq!(lead.email_status, EmailStatus::Replied);
}
