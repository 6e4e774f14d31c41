//! Sender configuration routes. Secrets are accepted but never returned.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::gateway::SenderIdentity;
use crate::gateway::validate::is_valid_email;

/// Body of `PUT /api/sender-configs/{email}`. Omitted secrets keep their
/// stored values.
#[derive(Debug, Deserialize)]
pub struct UpsertSenderRequest {
    pub display_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// GET /api/sender-configs
pub async fn list_senders(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.senders.summaries())
}

/// PUT /api/sender-configs/{email}
pub async fn upsert_sender(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(request): Json<UpsertSenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request(format!("Invalid sender email: {email}")));
    }

    let existing = state.senders.get(&email);
    let keep = |new: Option<String>, old: Option<SecretString>| {
        new.map(SecretString::from)
            .or(old)
            .unwrap_or_else(|| SecretString::from(String::new()))
    };
    let identity = SenderIdentity {
        password: keep(request.password, existing.as_ref().map(|s| s.password.clone())),
        api_key: keep(request.api_key, existing.as_ref().map(|s| s.api_key.clone())),
        email,
        display_name: request.display_name.trim().to_string(),
    };
    if !identity.is_valid() {
        return Err(ApiError::bad_request(
            "Sender needs a display name and an API key",
        ));
    }

    let summary = identity.summary();
    state.senders.upsert(identity)?;
    info!(sender = %summary.email, "Sender config saved");
    Ok(Json(summary))
}

/// DELETE /api/sender-configs/{email}
pub async fn delete_sender(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.senders.delete(&email)? {
        info!(sender = %email, "Sender config deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Sender not found"))
    }
}
