//! Conversation mapping: timestamp → {sender, message}.
//!
//! Keys are timestamp strings. Entries produced by this crate are normalised
//! to RFC 3339 UTC so the same instant always lands on the same key. Merging
//! is a union by key; on a duplicate key the incoming entry wins.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One message in a lead's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub sender: String,
    pub message: String,
}

impl ConversationEntry {
    pub fn new(sender: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            message: message.into(),
        }
    }
}

/// Timestamp-keyed conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    entries: BTreeMap<String, ConversationEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timestamp: impl Into<String>, entry: ConversationEntry) {
        self.entries.insert(timestamp.into(), entry);
    }

    pub fn get(&self, timestamp: &str) -> Option<&ConversationEntry> {
        self.entries.get(timestamp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConversationEntry)> {
        self.entries.iter()
    }

    /// Union with `other`. Keys present in both take `other`'s entry.
    pub fn merge(&mut self, other: Conversation) {
        self.entries.extend(other.entries);
    }

    /// Entries in chronological order. Keys that do not parse sort first.
    pub fn chronological(&self) -> Vec<(&str, &ConversationEntry)> {
        let mut items: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (parse_timestamp(k), k.as_str(), v))
            .collect();
        items.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        items.into_iter().map(|(_, k, v)| (k, v)).collect()
    }

    /// The most recent entry by parsed timestamp.
    ///
    /// Unparseable keys rank as oldest, so they are only returned when no
    /// key parses at all.
    pub fn latest(&self) -> Option<(&str, &ConversationEntry)> {
        self.entries
            .iter()
            .max_by(|a, b| (parse_timestamp(a.0), a.0).cmp(&(parse_timestamp(b.0), b.0)))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse a persisted history cell. Blank cells are an empty history.
    pub fn from_stored(cell: &str) -> Result<Self, serde_json::Error> {
        if cell.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(cell)
    }
}

impl FromIterator<(String, ConversationEntry)> for Conversation {
    fn from_iter<I: IntoIterator<Item = (String, ConversationEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Parse the timestamp formats seen in conversation keys.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` with a numeric offset,
/// and offset-less forms (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %:z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = s.trim_end_matches(" UTC").trim_end_matches(" GMT");
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(ndt.and_utc());
        }
    }
    None
}

/// Canonical key for a timestamp: RFC 3339 in UTC, second precision.
pub fn timestamp_key(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse and re-format a raw timestamp as a canonical key.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(timestamp_key)
}
