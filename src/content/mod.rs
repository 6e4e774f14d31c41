//! Outreach content: company research, cold email drafting and the HTML
//! email body.

pub mod generator;
pub mod homepage;
pub mod template;

pub use generator::{ContentGenerator, EmailDraft};
pub use homepage::HomepageScraper;
pub use template::render_email_html;
