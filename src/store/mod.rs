//! Lead persistence: the `LeadStore` trait and its libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlLeadStore;
pub use traits::LeadStore;
