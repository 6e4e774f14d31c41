//! Outbound email gateway: validated, round-robin delivery through the
//! transactional email HTTP API.

pub mod senders;
pub mod validate;

pub use senders::{SenderConfigStore, SenderIdentity, SenderSummary};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, ValidationError};
use validate::{clean_subject, validate_email_content};

/// Confirmation of an accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// Provider id of the sent email.
    pub email_id: String,
    pub request_id: String,
    pub from: String,
    pub from_full: String,
    pub to: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

/// Sends email on behalf of the configured sender identities.
///
/// One instance per process, shared behind an `Arc`. The rotation cursor
/// advances atomically on every `next_sender` call.
pub struct OutboundGateway {
    senders: Arc<SenderConfigStore>,
    cursor: AtomicUsize,
    client: reqwest::Client,
    config: GatewayConfig,
}

impl OutboundGateway {
    pub fn new(senders: Arc<SenderConfigStore>, config: GatewayConfig) -> Self {
        Self {
            senders,
            cursor: AtomicUsize::new(0),
            client: reqwest::Client::new(),
            config,
        }
    }

    /// The next sender in rotation: 0, 1, 2, 0, 1, ...
    pub fn next_sender(&self) -> Result<SenderIdentity, GatewayError> {
        let pool = self.senders.all();
        if pool.is_empty() {
            return Err(GatewayError::NoSenders);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        let sender = pool[idx].clone();
        if !sender.is_valid() {
            return Err(ValidationError::Sender(sender.email).into());
        }
        Ok(sender)
    }

    /// Validate, pick the next sender, and send.
    pub async fn send_round_robin(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        validate_email_content(to, subject, html)?;
        let sender = self.next_sender()?;
        self.send(&sender, to, subject, html).await
    }

    /// Send one email as `sender`.
    pub async fn send(
        &self,
        sender: &SenderIdentity,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        validate_email_content(to, subject, html)?;
        if !sender.is_valid() {
            return Err(ValidationError::Sender(sender.email.clone()).into());
        }

        let request_id = format!(
            "email_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let subject = clean_subject(subject);
        let from_full = sender.from_header();

        let body = serde_json::json!({
            "from": from_full,
            "to": to,
            "subject": subject,
            "html": html,
            "attachments": [],
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(sender.api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Delivery {
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(request_id = %request_id, to, status = status.as_u16(), "Email delivery rejected");
            return Err(GatewayError::Delivery {
                status: Some(status.as_u16()),
                reason: text,
            });
        }

        let email_id = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from))
            .ok_or_else(|| GatewayError::Delivery {
                status: Some(status.as_u16()),
                reason: "Missing email ID in successful response".into(),
            })?;

        info!(request_id = %request_id, email_id = %email_id, from = %sender.email, to, "Email sent");
        Ok(DeliveryReceipt {
            email_id,
            request_id,
            from: sender.email.clone(),
            from_full,
            to: to.to_string(),
            subject,
            sent_at: Utc::now(),
        })
    }
}
