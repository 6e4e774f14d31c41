//! Periodic reply polling across every sender mailbox.
//!
//! Each cycle loads the leads once and runs one monitor task per mailbox.
//! A failing mailbox is logged and never cancels its siblings. Cycles never
//! overlap: a manual trigger while a cycle runs is refused.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::gateway::SenderConfigStore;
use crate::monitor::{MonitorReport, ReplyMonitor};
use crate::store::LeadStore;

/// Outcome of one mailbox within a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MailboxOutcome {
    pub mailbox: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<MonitorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ReplyScheduler {
    monitor: Arc<ReplyMonitor>,
    senders: Arc<SenderConfigStore>,
    store: Arc<dyn LeadStore>,
    config: MonitorConfig,
    cycle: Mutex<()>,
}

impl ReplyScheduler {
    pub fn new(
        monitor: Arc<ReplyMonitor>,
        senders: Arc<SenderConfigStore>,
        store: Arc<dyn LeadStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            monitor,
            senders,
            store,
            config,
            cycle: Mutex::new(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Run one cycle, waiting for a running one to finish first.
    pub async fn check_all_mailboxes(&self) -> Vec<MailboxOutcome> {
        let _guard = self.cycle.lock().await;
        self.run_cycle().await
    }

    /// Run one cycle now, or return `None` if one is already running.
    pub async fn try_check_all_mailboxes(&self) -> Option<Vec<MailboxOutcome>> {
        let _guard = self.cycle.try_lock().ok()?;
        Some(self.run_cycle().await)
    }

    async fn run_cycle(&self) -> Vec<MailboxOutcome> {
        let accounts = self
            .senders
            .mailboxes(&self.config.imap_host, self.config.imap_port);
        if accounts.is_empty() {
            warn!("No sender mailboxes configured, skipping reply check");
            return Vec::new();
        }

        let leads = match self.store.get_all_leads().await {
            Ok(leads) => Arc::new(leads),
            Err(e) => {
                error!(error = %e, "Failed to load leads, skipping reply check");
                return Vec::new();
            }
        };

        let mut tasks = JoinSet::new();
        for account in accounts {
            let monitor = Arc::clone(&self.monitor);
            let leads = Arc::clone(&leads);
            tasks.spawn(async move {
                let mailbox = account.address.clone();
                let result = monitor.check_mailbox(account, &leads).await;
                (mailbox, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((mailbox, Ok(report))) => outcomes.push(MailboxOutcome {
                    mailbox,
                    report: Some(report),
                    error: None,
                }),
                Ok((mailbox, Err(e))) => {
                    error!(mailbox = %mailbox, error = %e, "Reply check failed");
                    outcomes.push(MailboxOutcome {
                        mailbox,
                        report: None,
                        error: Some(e.to_string()),
                    });
                }
                Err(e) => error!("Reply check task panicked: {e}"),
            }
        }

        outcomes.sort_by(|a, b| a.mailbox.cmp(&b.mailbox));
        outcomes
    }
}

/// Spawn the background poller.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_reply_poller(scheduler: Arc<ReplyScheduler>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        let interval = scheduler.poll_interval();
        info!("Reply poller started, checking every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Reply poller shutting down");
                return;
            }

            let outcomes = scheduler.check_all_mailboxes().await;
            let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
            info!(
                mailboxes = outcomes.len(),
                failed,
                "Reply check cycle complete"
            );
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SenderIdentity;
    use crate::leads::{EmailStatus, Lead};
    use crate::mail::MemoryConnector;
    use crate::monitor::HeaderConversationExtractor;
    use crate::store::LibSqlLeadStore;
    use secrecy::SecretString;

    fn sender(email: &str) -> SenderIdentity {
        SenderIdentity {
            email: email.into(),
            display_name: "Agency".into(),
            password: SecretString::from("pw"),
            api_key: SecretString::from("re_key"),
        }
    }

    async fn scheduler(connector: &MemoryConnector, senders: Vec<SenderIdentity>) -> (ReplyScheduler, Arc<LibSqlLeadStore>) {
        let store = Arc::new(LibSqlLeadStore::new_memory().await.unwrap());
        let mut lead = Lead::new("a@x.com", "Ada");
        lead.cold_email_subject = "Hello".into();
        lead.email_status = EmailStatus::Sent;
        store.insert_lead(&lead).await.unwrap();

        let monitor = Arc::new(ReplyMonitor::new(
            Arc::new(connector.clone()),
            Arc::new(HeaderConversationExtractor),
            store.clone(),
        ));
        let scheduler = ReplyScheduler::new(
            monitor,
            Arc::new(SenderConfigStore::from_senders(senders)),
            store.clone(),
            MonitorConfig::default(),
        );
        (scheduler, store)
    }

    #[tokio::test]
    async fn failing_mailbox_does_not_block_others() {
        let connector = MemoryConnector::new();
        connector.deliver(
            "good@agency.com",
            "Message-ID: <r1@x.com>\r\nFrom: a@x.com\r\nSubject: Re: Hello\r\n\
             Date: Wed, 01 May 2024 12:00:00 +0000\r\n\r\nSure\r\n",
        );
        connector.deliver("broken@agency.com", "Subject: x\r\n\r\nx\r\n");
        connector.fail_searches("broken@agency.com");

        let (scheduler, store) =
            scheduler(&connector, vec![sender("broken@agency.com"), sender("good@agency.com")]).await;
        let outcomes = scheduler.check_all_mailboxes().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_some());
        assert_eq!(outcomes[1].report.as_ref().unwrap().leads_updated, 1);

        let lead = store.get_lead("a@x.com").await.unwrap().unwrap();
        assert_eq!(lead.email_status, EmailStatus::Replied);
        assert_eq!(connector.stats("broken@agency.com").closed(), 1);
    }

    #[tokio::test]
    async fn no_mailboxes_means_no_work() {
        let connector = MemoryConnector::new();
        let (scheduler, _) = scheduler(&connector, vec![]).await;
        assert!(scheduler.check_all_mailboxes().await.is_empty());
    }

    #[tokio::test]
    async fn overlapping_manual_trigger_is_refused() {
        let connector = MemoryConnector::new();
        let (scheduler, _) = scheduler(&connector, vec![]).await;
        let _held = scheduler.cycle.lock().await;
        assert!(scheduler.try_check_all_mailboxes().await.is_none());
    }
}
