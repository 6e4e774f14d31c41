//! Lead routes: listing, details, drafting and sending.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::{ApiError, AppState, load_lead};
use crate::content::render_email_html;
use crate::error::GatewayError;
use crate::leads::{EmailStatus, LeadColumn, LeadUpdate};

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub subject: String,
    pub email: String,
}

/// GET /api/leads
pub async fn list_leads(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_all_leads().await?))
}

/// GET /api/leads/{email}
///
/// Lead details grouped for the review screen. Generates and stores the
/// company description when the lead has none yet.
pub async fn lead_details(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = load_lead(state.store.as_ref(), &email).await?;
    let description = state
        .generator
        .company_description_for(state.store.as_ref(), &lead)
        .await?;

    Ok(Json(json!({
        "basic_info": {
            "email": lead.email,
            "name": lead.name,
            "role": lead.role,
            "headline": lead.headline,
        },
        "company_info": {
            "company_name": lead.company_name,
            "company_domain": lead.company_domain,
            "company_size": lead.company_size,
            "industry": lead.industry,
            "company_description": description,
        },
        "email_status": {
            "status": lead.email_status,
            "last_sender": lead.last_sender,
            "last_message": lead.last_message,
            "email_subject": lead.cold_email_subject,
            "email_content": lead.email_content,
            "sender_email": lead.sender_email,
        },
    })))
}

/// POST /api/leads/{email}/generate-email
pub async fn generate_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = load_lead(state.store.as_ref(), &email).await?;
    let description = state
        .generator
        .company_description_for(state.store.as_ref(), &lead)
        .await?;
    let draft = state.generator.draft_cold_email(&lead, &description).await?;
    Ok(Json(draft))
}

/// POST /api/leads/{email}/generate-response
///
/// Follow-up reply drafted from the stored conversation.
pub async fn generate_response(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = load_lead(state.store.as_ref(), &email).await?;
    let response = state.generator.draft_follow_up(&lead).await?;
    Ok(Json(json!({ "response": response })))
}

/// POST /api/leads/{email}/send-email
///
/// Render, send round-robin, and record the outcome on the lead. A rejected
/// delivery marks the lead Failed; validation errors leave it untouched.
pub async fn send_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(request): Json<SendEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = load_lead(state.store.as_ref(), &email).await?;
    let html = render_email_html(&request.email, &state.agency);

    let receipt = match state
        .gateway
        .send_round_robin(&lead.email, &request.subject, &html)
        .await
    {
        Ok(receipt) => receipt,
        Err(e @ GatewayError::Delivery { .. }) => {
            let failed = LeadUpdate::new().status(EmailStatus::Failed);
            if let Err(db) = state.store.update_lead(&lead.email, &failed).await {
                error!(lead = %lead.email, error = %db, "Failed to record delivery failure");
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let update = LeadUpdate::new()
        .status(EmailStatus::Sent)
        .set(LeadColumn::ColdEmailSubject, receipt.subject.as_str())
        .set(LeadColumn::EmailContent, request.email.as_str())
        .set(LeadColumn::SenderEmail, receipt.from.as_str())
        .set(LeadColumn::MessageId, receipt.email_id.as_str());
    state.store.update_lead(&lead.email, &update).await?;
    info!(lead = %lead.email, from = %receipt.from, email_id = %receipt.email_id, "Cold email recorded");

    Ok(Json(json!({
        "success": true,
        "message": "Email sent successfully",
        "details": receipt,
    })))
}
