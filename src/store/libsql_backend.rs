//! libSQL backend: async `LeadStore` implementation.
//!
//! Supports a local database file and an in-memory database for tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::leads::{EmailStatus, Lead, LeadColumn, LeadUpdate};
use crate::store::migrations;
use crate::store::traits::LeadStore;

/// Column order used by every SELECT; `row_to_lead` depends on it.
const LEAD_COLUMNS: &str = "email, name, role, headline, company_name, company_domain, \
     company_size, industry, company_background, cold_email_subject, email_content, \
     email_status, last_sender, last_message, conversation_history, sender_email, message_id";

/// libSQL lead store.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlLeadStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlLeadStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Lead database opened");
        Ok(store)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let text = |idx: i32| row.get::<String>(idx);
    Ok(Lead {
        email: text(0)?,
        name: text(1)?,
        role: text(2)?,
        headline: text(3)?,
        company_name: text(4)?,
        company_domain: text(5)?,
        company_size: text(6)?,
        industry: text(7)?,
        company_background: text(8)?,
        cold_email_subject: text(9)?,
        email_content: text(10)?,
        email_status: EmailStatus::from_cell(&text(11)?),
        last_sender: text(12)?,
        last_message: text(13)?,
        conversation_history: text(14)?,
        sender_email: text(15)?,
        message_id: text(16)?,
    })
}

#[async_trait]
impl LeadStore for LibSqlLeadStore {
    async fn get_all_leads(&self) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn
            .query(&format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY rowid ASC"), ())
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all_leads: {e}")))?
        {
            leads.push(
                row_to_lead(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            );
        }
        Ok(leads)
    }

    async fn get_lead(&self, email: &str) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?1 COLLATE NOCASE"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_lead(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn update_lead(&self, email: &str, update: &LeadUpdate) -> Result<(), DatabaseError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();
        for (idx, (column, value)) in update.fields().enumerate() {
            assignments.push(format!("{} = ?{}", column.key(), idx + 1));
            values.push(libsql::Value::Text(value.clone()));
        }
        values.push(libsql::Value::Text(email.to_string()));
        let sql = format!(
            "UPDATE leads SET {}, updated_at = datetime('now') WHERE email = ?{} COLLATE NOCASE",
            assignments.join(", "),
            values.len()
        );

        let affected = self
            .conn
            .execute(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("update_lead: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: email.to_string(),
            });
        }

        debug!(
            lead = email,
            columns = ?update.fields().map(|(c, _)| c.header()).collect::<Vec<_>>(),
            "Lead updated"
        );
        Ok(())
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        if lead.email.trim().is_empty() {
            return Err(DatabaseError::Constraint(format!(
                "{} is required",
                LeadColumn::Email.header()
            )));
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    lead.email.clone(),
                    lead.name.clone(),
                    lead.role.clone(),
                    lead.headline.clone(),
                    lead.company_name.clone(),
                    lead.company_domain.clone(),
                    lead.company_size.clone(),
                    lead.industry.clone(),
                    lead.company_background.clone(),
                    lead.cold_email_subject.clone(),
                    lead.email_content.clone(),
                    lead.email_status.as_str(),
                    lead.last_sender.clone(),
                    lead.last_message.clone(),
                    lead.conversation_history.clone(),
                    lead.sender_email.clone(),
                    lead.message_id.clone(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("lead {} already exists", lead.email))
                } else {
                    DatabaseError::Query(format!("insert_lead: {msg}"))
                }
            })?;

        debug!(lead = %lead.email, "Lead inserted");
        Ok(())
    }
}
