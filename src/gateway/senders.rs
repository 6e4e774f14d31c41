//! Sender identities persisted in a TOML file.
//!
//! One table per sender address, in file order:
//!
//! ```toml
//! ["krishna@agency.com"]
//! display_name = "Krishna"
//! password = "imap password"
//! api_key = "re_..."
//! ```

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::mail::MailboxAccount;

/// A sending identity. Its password doubles as the mailbox login.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub email: String,
    pub display_name: String,
    pub password: SecretString,
    pub api_key: SecretString,
}

impl SenderIdentity {
    /// Usable for sending: email, display name and API key all present.
    pub fn is_valid(&self) -> bool {
        !self.email.trim().is_empty()
            && !self.display_name.trim().is_empty()
            && !self.api_key.expose_secret().trim().is_empty()
    }

    pub fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }

    /// `"Display Name <email>"`.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.display_name, self.email)
    }

    pub fn summary(&self) -> SenderSummary {
        SenderSummary {
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            has_password: self.has_password(),
            has_api_key: !self.api_key.expose_secret().is_empty(),
        }
    }
}

/// Sender view with secrets redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderSummary {
    pub email: String,
    pub display_name: String,
    pub has_password: bool,
    pub has_api_key: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SenderSection {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    api_key: String,
}

/// The sender list, shared between the gateway, the poller and the API.
#[derive(Debug)]
pub struct SenderConfigStore {
    path: Option<PathBuf>,
    senders: RwLock<Vec<SenderIdentity>>,
}

impl SenderConfigStore {
    /// Load from `path`. A missing file yields an empty store that will be
    /// created on the first write.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let senders = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            parse_senders(&content)?
        } else {
            warn!(path = %path.display(), "Sender config file not found, starting empty");
            Vec::new()
        };

        info!(path = %path.display(), senders = senders.len(), "Sender configs loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            senders: RwLock::new(senders),
        })
    }

    /// In-memory store that never touches disk.
    pub fn from_senders(senders: Vec<SenderIdentity>) -> Self {
        Self {
            path: None,
            senders: RwLock::new(senders),
        }
    }

    /// All senders in file order.
    pub fn all(&self) -> Vec<SenderIdentity> {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, email: &str) -> Option<SenderIdentity> {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn summaries(&self) -> Vec<SenderSummary> {
        self.all().iter().map(SenderIdentity::summary).collect()
    }

    /// Mailboxes to poll: every sender with a password.
    pub fn mailboxes(&self, host: &str, port: u16) -> Vec<MailboxAccount> {
        self.all()
            .into_iter()
            .filter(SenderIdentity::has_password)
            .map(|s| MailboxAccount {
                address: s.email,
                password: s.password,
                host: host.to_string(),
                port,
            })
            .collect()
    }

    /// Add a sender or replace the one with the same address, then persist.
    pub fn upsert(&self, identity: SenderIdentity) -> Result<(), ConfigError> {
        let snapshot = {
            let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
            match senders
                .iter_mut()
                .find(|s| s.email.eq_ignore_ascii_case(&identity.email))
            {
                Some(existing) => *existing = identity,
                None => senders.push(identity),
            }
            senders.clone()
        };
        self.save(&snapshot)
    }

    /// Remove a sender and persist. Returns `false` if it was not present.
    pub fn delete(&self, email: &str) -> Result<bool, ConfigError> {
        let snapshot = {
            let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
            let before = senders.len();
            senders.retain(|s| !s.email.eq_ignore_ascii_case(email));
            if senders.len() == before {
                return Ok(false);
            }
            senders.clone()
        };
        self.save(&snapshot)?;
        Ok(true)
    }

    fn save(&self, senders: &[SenderIdentity]) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = render_senders(senders)?;
        write_atomic(path, &content)?;
        info!(path = %path.display(), senders = senders.len(), "Sender configs saved");
        Ok(())
    }
}

fn parse_senders(content: &str) -> Result<Vec<SenderIdentity>, ConfigError> {
    let table: toml::Table = content
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

    table
        .into_iter()
        .map(|(email, value)| {
            let section: SenderSection = value
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::ParseError(format!("[{email}]: {e}")))?;
            Ok(SenderIdentity {
                email,
                display_name: section.display_name,
                password: SecretString::from(section.password),
                api_key: SecretString::from(section.api_key),
            })
        })
        .collect()
}

fn render_senders(senders: &[SenderIdentity]) -> Result<String, ConfigError> {
    let mut table = toml::Table::new();
    for sender in senders {
        let section = SenderSection {
            display_name: sender.display_name.clone(),
            password: sender.password.expose_secret().to_string(),
            api_key: sender.api_key.expose_secret().to_string(),
        };
        let value = toml::Value::try_from(section)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        table.insert(sender.email.clone(), value);
    }
    toml::to_string(&table).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn write_atomic(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str, password: &str, api_key: &str) -> SenderIdentity {
        SenderIdentity {
            email: email.into(),
            display_name: "Krishna".into(),
            password: SecretString::from(password),
            api_key: SecretString::from(api_key),
        }
    }

    const FILE: &str = r#"
["b@agency.com"]
display_name = "Bea"
password = "pw-b"
api_key = "re_b"

["a@agency.com"]
display_name = "Al"
api_key = "re_a"
"#;

    #[test]
    fn load_preserves_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("senders.toml");
        std::fs::write(&path, FILE).unwrap();

        let store = SenderConfigStore::load(&path).unwrap();
        let emails: Vec<_> = store.all().into_iter().map(|s| s.email).collect();
        assert_eq!(emails, vec!["b@agency.com", "a@agency.com"]);
        assert_eq!(store.get("A@agency.com").unwrap().display_name, "Al");
    }

    #[test]
    fn mailboxes_require_a_password() {
        let store = SenderConfigStore::from_senders(vec![
            identity("a@agency.com", "pw", "re_a"),
            identity("b@agency.com", "", "re_b"),
        ]);
        let boxes = store.mailboxes("mail.example.com", 993);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].address, "a@agency.com");
        assert_eq!(boxes[0].host, "mail.example.com");
    }

    #[test]
    fn upsert_and_delete_rewrite_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("senders.toml");
        let store = SenderConfigStore::load(&path).unwrap();
        assert!(store.all().is_empty());

        store.upsert(identity("a@agency.com", "pw", "re_a")).unwrap();
        store.upsert(identity("b@agency.com", "pw", "re_b")).unwrap();
        store
            .upsert(SenderIdentity {
                display_name: "Alice".into(),
                ..identity("a@agency.com", "pw2", "re_a2")
            })
            .unwrap();
        assert!(store.delete("b@agency.com").unwrap());
        assert!(!store.delete("b@agency.com").unwrap());

        let reloaded = SenderConfigStore::load(&path).unwrap();
        let all = reloaded.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name, "Alice");
        assert_eq!(all[0].api_key.expose_secret(), "re_a2");
    }

    #[test]
    fn validity_and_redaction() {
        let good = identity("a@agency.com", "pw", "re_a");
        assert!(good.is_valid());
        assert!(!identity("a@agency.com", "pw", "").is_valid());
        assert_eq!(good.from_header(), "Krishna <a@agency.com>");

        let summary = good.summary();
        assert!(summary.has_password && summary.has_api_key);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("re_a\""));
        assert!(!json.contains("\"pw\""));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("senders.toml");
        std::fs::write(&path, "[broken").unwrap();
        assert!(matches!(
            SenderConfigStore::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
