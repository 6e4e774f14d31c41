//! `LeadStore` trait: the narrow contract the rest of the crate uses for
//! lead persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::leads::{Lead, LeadUpdate};

/// Read/write access to lead records keyed by email address.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// All leads, in insertion order.
    async fn get_all_leads(&self) -> Result<Vec<Lead>, DatabaseError>;

    /// A single lead, or `None` if the email is unknown.
    async fn get_lead(&self, email: &str) -> Result<Option<Lead>, DatabaseError>;

    /// Write the given columns of one lead. Unknown emails are `NotFound`.
    async fn update_lead(&self, email: &str, update: &LeadUpdate) -> Result<(), DatabaseError>;

    /// Insert a lead created upstream. Duplicate emails are a constraint error.
    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;
}
