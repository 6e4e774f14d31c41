//! Configuration types, built from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default IMAP server used by every sender mailbox.
pub const DEFAULT_IMAP_HOST: &str = "mail.privateemail.com";
/// Default IMAPS port.
pub const DEFAULT_IMAP_PORT: u16 = 993;
/// Default reply poll interval: once a minute.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
/// Transactional email endpoint.
pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP API binds to.
    pub bind: SocketAddr,
    /// libSQL database file holding lead records.
    pub db_path: PathBuf,
    /// TOML file with one section per sender identity.
    pub senders_file: PathBuf,
    /// Front-end origin allowed by CORS.
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = env_or("OUTREACH_BIND", "0.0.0.0:8080");
        let bind = bind.parse().map_err(|e| ConfigError::InvalidValue {
            key: "OUTREACH_BIND".into(),
            message: format!("{e}"),
        })?;

        Ok(Self {
            bind,
            db_path: PathBuf::from(env_or("OUTREACH_DB_PATH", "./data/outreach.db")),
            senders_file: PathBuf::from(env_or("OUTREACH_SENDERS_FILE", "./senders.toml")),
            cors_origin: env_or("OUTREACH_CORS_ORIGIN", "http://localhost:3000"),
        })
    }
}

/// How conversation entries are pulled out of a reply thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Ask the language model to parse the latest message body.
    #[default]
    Llm,
    /// Build entries directly from the thread's headers and bodies.
    Headers,
}

impl FromStr for ExtractionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "headers" => Ok(Self::Headers),
            other => Err(ConfigError::InvalidValue {
                key: "REPLY_EXTRACTION".into(),
                message: format!("expected `llm` or `headers`, got `{other}`"),
            }),
        }
    }
}

/// Reply monitor settings shared by all mailboxes.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub poll_interval: Duration,
    pub extraction: ExtractionMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            imap_host: DEFAULT_IMAP_HOST.to_string(),
            imap_port: DEFAULT_IMAP_PORT,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            extraction: ExtractionMode::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_port = parse_env("IMAP_PORT", DEFAULT_IMAP_PORT)?;
        let poll_secs = parse_env("REPLY_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REPLY_POLL_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        let extraction = match std::env::var("REPLY_EXTRACTION") {
            Ok(v) => v.parse()?,
            Err(_) => ExtractionMode::default(),
        };

        Ok(Self {
            imap_host: env_or("IMAP_HOST", DEFAULT_IMAP_HOST),
            imap_port,
            poll_interval: Duration::from_secs(poll_secs),
            extraction,
        })
    }
}

/// Outbound gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_RESEND_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env_or("RESEND_API_URL", DEFAULT_RESEND_API_URL),
            ..Self::default()
        }
    }
}

/// Agency details used in prompts, placeholders and the HTML footer.
#[derive(Debug, Clone)]
pub struct AgencyConfig {
    pub name: String,
    pub description: String,
    pub website: String,
    pub calendar_link: String,
    pub sender_name: String,
    pub sender_position: String,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            name: "Kuberanix".into(),
            description: "We specialize in digital transformation through web development, \
                          mobile apps, cloud solutions, and DevOps services."
                .into(),
            website: "https://kuberanix.com".into(),
            calendar_link: "https://calendly.com/kuberanix".into(),
            sender_name: "Krishna".into(),
            sender_position: "Business Development Manager".into(),
        }
    }
}

impl AgencyConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            name: env_or("AGENCY_NAME", &d.name),
            description: env_or("AGENCY_INFO", &d.description),
            website: env_or("AGENCY_WEBSITE_LINK", &d.website),
            calendar_link: env_or("CALENDAR_LINK", &d.calendar_link),
            sender_name: env_or("SENDER_NAME", &d.sender_name),
            sender_position: env_or("SENDER_POSITION", &d.sender_position),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
