//! Reply monitoring: correlate mailbox replies with outreach leads and keep
//! each lead's conversation state current.

pub mod extract;
pub mod reply_monitor;
pub mod threads;

pub use extract::{ConversationExtractor, HeaderConversationExtractor, LlmConversationExtractor};
pub use reply_monitor::{MonitorReport, ReplyMonitor};
pub use threads::{LeadTarget, ThreadSnapshot};
