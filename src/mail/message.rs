//! Parsed inbound email plus the text helpers used on message bodies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser, MimeHeaders};

/// A raw mailbox message parsed into the fields reply correlation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEmail {
    /// Mailbox sequence number the message was fetched from.
    pub seq: u32,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// `References` ids, oldest first.
    pub references: Vec<String>,
    /// Outlook/Exchange conversation header, used when no RFC 5322 ids exist.
    pub thread_index: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    /// Readable body: plain text, or stripped HTML as a fallback.
    pub body: String,
}

impl InboundEmail {
    /// Parse an RFC 822 message. Returns `None` if the bytes are not a message.
    pub fn parse(seq: u32, raw: &[u8]) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let date = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

        Some(Self {
            seq,
            message_id: parsed.message_id().and_then(normalize_message_id),
            in_reply_to: header_texts(parsed.in_reply_to())
                .into_iter()
                .find_map(|id| normalize_message_id(&id)),
            references: header_texts(parsed.references())
                .iter()
                .flat_map(|v| v.split_whitespace())
                .filter_map(normalize_message_id)
                .collect(),
            thread_index: parsed
                .header_raw("Thread-Index")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            subject: parsed
                .subject()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            from: extract_addresses(parsed.from()).into_iter().next(),
            to: extract_addresses(parsed.to()),
            cc: extract_addresses(parsed.cc()),
            date,
            body: extract_text(&parsed),
        })
    }

    /// Identifier of the conversation this message belongs to.
    ///
    /// The root of the `References` chain, falling back to `In-Reply-To`,
    /// the message's own `Message-ID`, then `Thread-Index`. Every message of
    /// one thread resolves to the same id.
    pub fn thread_id(&self) -> Option<String> {
        self.references
            .first()
            .cloned()
            .or_else(|| self.in_reply_to.clone())
            .or_else(|| self.message_id.clone())
            .or_else(|| self.thread_index.clone())
    }

    /// Every address on From, To and Cc, lowercased.
    pub fn participants(&self) -> BTreeSet<String> {
        self.from
            .iter()
            .chain(self.to.iter())
            .chain(self.cc.iter())
            .map(|a| parse_address(a).to_ascii_lowercase())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Whether this message mentions `id` as its own id or as a parent.
    pub fn belongs_to_thread(&self, id: &str) -> bool {
        self.message_id.as_deref() == Some(id)
            || self.in_reply_to.as_deref() == Some(id)
            || self.references.iter().any(|r| r == id)
            || self.thread_index.as_deref() == Some(id)
    }
}

/// Strip angle brackets and whitespace from a message id.
pub fn normalize_message_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|ch| matches!(ch, '<' | '>')).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract the bare address from `"Name <user@host>"`.
pub fn parse_address(header: &str) -> &str {
    let header = header.trim();
    if let Some(start) = header.find('<') {
        let rest = &header[start + 1..];
        return rest.split('>').next().unwrap_or(rest).trim();
    }
    header
}

/// Compare two address headers by their bare, case-folded address.
pub fn same_address(a: &str, b: &str) -> bool {
    parse_address(a).eq_ignore_ascii_case(parse_address(b))
}

fn header_texts(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(text) => vec![text.to_string()],
        HeaderValue::TextList(list) => list.iter().map(|t| t.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Extract email addresses from an optional mail_parser Address field.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip quoted history from a reply body.
///
/// Drops `>`-prefixed lines and everything after an `On ... wrote:`
/// attribution or an `Original Message` separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }
        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }
    while result.first().is_some_and(|l| l.trim().is_empty()) {
        result.remove(0);
    }

    result.join("\n")
}
