//! One reply-monitoring pass over one mailbox.
//!
//! Phase 1 runs the blocking mailbox scan on the blocking pool and always
//! releases the session before returning. Phase 2 extracts a conversation
//! per thread, merges by lead, and writes each lead back once.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, MailboxError};
use crate::leads::{Conversation, Lead, LeadColumn, LeadUpdate, SenderType};
use crate::mail::mailbox::{MailboxAccount, MailboxConnector};
use crate::mail::message::same_address;
use crate::monitor::extract::ConversationExtractor;
use crate::monitor::threads::{LeadTarget, scan_mailbox};
use crate::store::LeadStore;

/// Summary of one mailbox pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub mailbox: String,
    /// Distinct threads found for outreach leads.
    pub threads_found: usize,
    /// Threads whose conversation was extracted.
    pub threads_processed: usize,
    pub extraction_failures: usize,
    pub leads_updated: usize,
    /// Matched messages without a subject or thread id.
    pub skipped: usize,
}

pub struct ReplyMonitor {
    connector: Arc<dyn MailboxConnector>,
    extractor: Arc<dyn ConversationExtractor>,
    store: Arc<dyn LeadStore>,
}

impl ReplyMonitor {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        extractor: Arc<dyn ConversationExtractor>,
        store: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            connector,
            extractor,
            store,
        }
    }

    /// Scan `account` for replies to `leads` and update the matching leads.
    ///
    /// Mailbox failures abort this pass only. Extraction or write failures
    /// for a single thread or lead are logged and skipped.
    pub async fn check_mailbox(
        &self,
        account: MailboxAccount,
        leads: &[Lead],
    ) -> Result<MonitorReport, MailboxError> {
        let mut report = MonitorReport {
            mailbox: account.address.clone(),
            ..MonitorReport::default()
        };

        let targets = LeadTarget::from_leads(leads);
        if targets.is_empty() {
            debug!(mailbox = %account.address, "No outreach leads to correlate");
            return Ok(report);
        }

        let connector = Arc::clone(&self.connector);
        let scan_account = account.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            scan_mailbox(connector.as_ref(), &scan_account, &targets)
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("mailbox scan task failed: {e}")))??;

        report.threads_found = outcome.threads.len();
        report.skipped = outcome.skipped;

        let mut conversations: BTreeMap<String, Conversation> = BTreeMap::new();
        for thread in &outcome.threads {
            match self.extractor.extract(thread).await {
                Ok(conversation) => {
                    report.threads_processed += 1;
                    conversations
                        .entry(thread.lead_email.clone())
                        .or_default()
                        .merge(conversation);
                }
                Err(e) => {
                    report.extraction_failures += 1;
                    warn!(
                        mailbox = %account.address,
                        lead = %thread.lead_email,
                        thread = %thread.thread_id,
                        error = %e,
                        "Conversation extraction failed, skipping thread"
                    );
                }
            }
        }

        for (lead_email, conversation) in conversations {
            if conversation.is_empty() {
                continue;
            }
            match self
                .write_back(&account.address, &lead_email, &conversation)
                .await
            {
                Ok(true) => report.leads_updated += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    mailbox = %account.address,
                    lead = %lead_email,
                    error = %e,
                    "Failed to update lead"
                ),
            }
        }

        info!(
            mailbox = %report.mailbox,
            threads = report.threads_found,
            processed = report.threads_processed,
            failures = report.extraction_failures,
            updated = report.leads_updated,
            "Mailbox pass complete"
        );
        Ok(report)
    }

    /// Apply a pass's conversation to one lead. Returns `false` if the lead
    /// no longer exists.
    async fn write_back(
        &self,
        mailbox: &str,
        lead_email: &str,
        conversation: &Conversation,
    ) -> Result<bool, DatabaseError> {
        let Some(lead) = self.store.get_lead(lead_email).await? else {
            warn!(lead = %lead_email, "Lead disappeared before write-back");
            return Ok(false);
        };
        let history = match Conversation::from_stored(&lead.conversation_history) {
            Ok(mut history) => {
                history.merge(conversation.clone());
                Some(history)
            }
            Err(e) => {
                warn!(
                    lead = %lead_email,
                    error = %e,
                    "Stored conversation history is not valid JSON, leaving it unchanged"
                );
                None
            }
        };

        // Latest across stored and new entries.
        let Some((timestamp, latest)) = history
            .as_ref()
            .and_then(Conversation::latest)
            .or_else(|| conversation.latest())
        else {
            return Ok(false);
        };

        let sender_type = if same_address(&latest.sender, mailbox) {
            SenderType::Agency
        } else {
            SenderType::Client
        };

        let mut update = LeadUpdate::new()
            .status(lead.email_status.on_reply())
            .set(LeadColumn::LastSender, sender_type.as_str())
            .set(LeadColumn::LastMessage, latest.message.clone());
        if let Some(history) = &history {
            update = update.set(LeadColumn::ConversationHistory, history.to_json());
        }

        self.store.update_lead(&lead.email, &update).await?;
        debug!(
            lead = %lead_email,
            latest = %timestamp,
            sender = %sender_type,
            "Lead updated from reply"
        );
        Ok(true)
    }
}
