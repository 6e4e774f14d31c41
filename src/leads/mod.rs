//! Lead records and their conversation history.

pub mod conversation;
pub mod model;

pub use conversation::{Conversation, ConversationEntry};
pub use model::{EmailStatus, Lead, LeadColumn, LeadUpdate, SenderType};
