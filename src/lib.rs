//! Outreach Assist: cold outreach drafting, round-robin sending and reply
//! tracking for a lead list.

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod gateway;
pub mod leads;
pub mod llm;
pub mod mail;
pub mod monitor;
pub mod scheduler;
pub mod store;
