//! Lead record, status enums and the column set shared with the lead sheet.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outreach status of a lead.
///
/// Progresses New → Sent → Replied/Active. Failed can be entered from any
/// state once a send has been attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmailStatus {
    #[default]
    New,
    Sent,
    Replied,
    Active,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Sent => "Sent",
            Self::Replied => "Replied",
            Self::Active => "Active",
            Self::Failed => "Failed",
        }
    }

    /// Status to write when a reply has been observed.
    ///
    /// Active already implies an ongoing conversation and is kept as is.
    pub fn on_reply(self) -> Self {
        match self {
            Self::Active => Self::Active,
            _ => Self::Replied,
        }
    }

    /// Replied and Active both mean the lead is in a conversation.
    pub fn is_conversation(&self) -> bool {
        matches!(self, Self::Replied | Self::Active)
    }

    /// Parse a stored status; blank cells mean the lead is new.
    pub fn from_cell(cell: &str) -> Self {
        cell.parse().unwrap_or_default()
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "new" => Ok(Self::New),
            "sent" => Ok(Self::Sent),
            "replied" => Ok(Self::Replied),
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown email status: {other}")),
        }
    }
}

/// Who wrote the most recent message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderType {
    Agency,
    Client,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agency => "Agency",
            Self::Client => "Client",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns of the lead sheet, named by their header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeadColumn {
    Name,
    Email,
    CompanyName,
    CompanyDomain,
    CompanySize,
    Role,
    Headline,
    Industry,
    CompanyBackground,
    ColdEmailSubject,
    EmailContent,
    EmailStatus,
    LastSender,
    LastMessage,
    ConversationHistory,
    SenderEmail,
    MessageId,
}

impl LeadColumn {
    pub const ALL: [LeadColumn; 17] = [
        Self::Name,
        Self::Email,
        Self::CompanyName,
        Self::CompanyDomain,
        Self::CompanySize,
        Self::Role,
        Self::Headline,
        Self::Industry,
        Self::CompanyBackground,
        Self::ColdEmailSubject,
        Self::EmailContent,
        Self::EmailStatus,
        Self::LastSender,
        Self::LastMessage,
        Self::ConversationHistory,
        Self::SenderEmail,
        Self::MessageId,
    ];

    /// Header text as it appears in the lead sheet.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Email => "Email",
            Self::CompanyName => "Company Name",
            Self::CompanyDomain => "Company Domain",
            Self::CompanySize => "Company Size",
            Self::Role => "Role",
            Self::Headline => "Headline",
            Self::Industry => "Industry",
            Self::CompanyBackground => "Company Background",
            Self::ColdEmailSubject => "Cold Email Subject",
            Self::EmailContent => "Email Content",
            Self::EmailStatus => "Email Status",
            Self::LastSender => "Last Sender",
            Self::LastMessage => "Last Message",
            Self::ConversationHistory => "Conversation History",
            Self::SenderEmail => "Sender Email",
            Self::MessageId => "Message ID",
        }
    }

    /// Storage column name (snake_case header).
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::CompanyName => "company_name",
            Self::CompanyDomain => "company_domain",
            Self::CompanySize => "company_size",
            Self::Role => "role",
            Self::Headline => "headline",
            Self::Industry => "industry",
            Self::CompanyBackground => "company_background",
            Self::ColdEmailSubject => "cold_email_subject",
            Self::EmailContent => "email_content",
            Self::EmailStatus => "email_status",
            Self::LastSender => "last_sender",
            Self::LastMessage => "last_message",
            Self::ConversationHistory => "conversation_history",
            Self::SenderEmail => "sender_email",
            Self::MessageId => "message_id",
        }
    }

    /// Columns every lead row must carry.
    pub fn required() -> &'static [LeadColumn] {
        &[
            Self::Name,
            Self::Email,
            Self::CompanyName,
            Self::CompanyDomain,
            Self::EmailStatus,
            Self::SenderEmail,
        ]
    }

    pub fn optional() -> Vec<LeadColumn> {
        Self::ALL
            .iter()
            .copied()
            .filter(|c| !Self::required().contains(c))
            .collect()
    }

    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.header().eq_ignore_ascii_case(header.trim()) || c.key() == header.trim())
    }
}

/// A prospective contact, keyed by email address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub email: String,
    pub name: String,
    pub role: String,
    pub headline: String,
    pub company_name: String,
    pub company_domain: String,
    pub company_size: String,
    pub industry: String,
    pub company_background: String,
    pub cold_email_subject: String,
    pub email_content: String,
    pub email_status: EmailStatus,
    pub last_sender: String,
    pub last_message: String,
    /// Serialized conversation mapping (JSON object keyed by timestamp).
    pub conversation_history: String,
    pub sender_email: String,
    /// Provider id returned for the last outbound send.
    pub message_id: String,
}

impl Lead {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// First word of the display name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    /// Leads without an outbound subject have nothing to correlate replies on.
    pub fn has_outbound_subject(&self) -> bool {
        !self.cold_email_subject.trim().is_empty()
    }

    pub fn get(&self, column: LeadColumn) -> &str {
        match column {
            LeadColumn::Name => &self.name,
            LeadColumn::Email => &self.email,
            LeadColumn::CompanyName => &self.company_name,
            LeadColumn::CompanyDomain => &self.company_domain,
            LeadColumn::CompanySize => &self.company_size,
            LeadColumn::Role => &self.role,
            LeadColumn::Headline => &self.headline,
            LeadColumn::Industry => &self.industry,
            LeadColumn::CompanyBackground => &self.company_background,
            LeadColumn::ColdEmailSubject => &self.cold_email_subject,
            LeadColumn::EmailContent => &self.email_content,
            LeadColumn::EmailStatus => self.email_status.as_str(),
            LeadColumn::LastSender => &self.last_sender,
            LeadColumn::LastMessage => &self.last_message,
            LeadColumn::ConversationHistory => &self.conversation_history,
            LeadColumn::SenderEmail => &self.sender_email,
            LeadColumn::MessageId => &self.message_id,
        }
    }

    /// Apply a field map in place.
    pub fn apply(&mut self, update: &LeadUpdate) {
        for (column, value) in update.fields() {
            let value = value.clone();
            match column {
                LeadColumn::Name => self.name = value,
                LeadColumn::Email => self.email = value,
                LeadColumn::CompanyName => self.company_name = value,
                LeadColumn::CompanyDomain => self.company_domain = value,
                LeadColumn::CompanySize => self.company_size = value,
                LeadColumn::Role => self.role = value,
                LeadColumn::Headline => self.headline = value,
                LeadColumn::Industry => self.industry = value,
                LeadColumn::CompanyBackground => self.company_background = value,
                LeadColumn::ColdEmailSubject => self.cold_email_subject = value,
                LeadColumn::EmailContent => self.email_content = value,
                LeadColumn::EmailStatus => self.email_status = EmailStatus::from_cell(&value),
                LeadColumn::LastSender => self.last_sender = value,
                LeadColumn::LastMessage => self.last_message = value,
                LeadColumn::ConversationHistory => self.conversation_history = value,
                LeadColumn::SenderEmail => self.sender_email = value,
                LeadColumn::MessageId => self.message_id = value,
            }
        }
    }
}

/// A partial update: column → new cell value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadUpdate {
    fields: BTreeMap<LeadColumn, String>,
}

impl LeadUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: LeadColumn, value: impl Into<String>) -> Self {
        self.fields.insert(column, value.into());
        self
    }

    pub fn status(self, status: EmailStatus) -> Self {
        self.set(LeadColumn::EmailStatus, status.as_str())
    }

    pub fn get(&self, column: LeadColumn) -> Option<&str> {
        self.fields.get(&column).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&LeadColumn, &String)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
