//! REST API for the outreach front-end.

pub mod leads;
pub mod senders;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AgencyConfig;
use crate::content::ContentGenerator;
use crate::error::{ConfigError, ContentError, DatabaseError, GatewayError};
use crate::gateway::{OutboundGateway, SenderConfigStore};
use crate::leads::{EmailStatus, Lead};
use crate::scheduler::ReplyScheduler;
use crate::store::LeadStore;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeadStore>,
    pub generator: Arc<ContentGenerator>,
    pub gateway: Arc<OutboundGateway>,
    pub senders: Arc<SenderConfigStore>,
    pub scheduler: Arc<ReplyScheduler>,
    pub agency: AgencyConfig,
}

/// An error rendered as `{"error": message}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { .. } => Self::not_found(e.to_string()),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::MissingDomain(_) | ContentError::Fetch { .. } => {
                Self::bad_request(e.to_string())
            }
            ContentError::Database(db) => db.into(),
            other => Self::new(StatusCode::BAD_GATEWAY, other.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match &e {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Delivery { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::NoSenders => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// Look a lead up by email, 404 if unknown.
pub(crate) async fn load_lead(store: &dyn LeadStore, email: &str) -> Result<Lead, ApiError> {
    store
        .get_lead(email)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead not found"))
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "outreach-assist"}))
}

/// GET /api/dashboard
///
/// Lead totals: all leads, leads awaiting a reply, leads in conversation.
async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let leads = state.store.get_all_leads().await?;
    let outreach = leads
        .iter()
        .filter(|l| l.email_status == EmailStatus::Sent)
        .count();
    let conversations = leads
        .iter()
        .filter(|l| l.email_status.is_conversation())
        .count();

    Ok(Json(json!({
        "total_leads": leads.len(),
        "outreach": outreach,
        "conversations": conversations,
    })))
}

/// POST /api/replies/check
///
/// Run one reply check now. 409 if a cycle is already running.
async fn check_replies(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.scheduler.try_check_all_mailboxes().await {
        Some(outcomes) => Ok(Json(json!({ "mailboxes": outcomes }))),
        None => Err(ApiError::new(
            StatusCode::CONFLICT,
            "A reply check is already running",
        )),
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            warn!(origin, error = %e, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}

/// Build the full API router.
pub fn routes(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/dashboard", get(dashboard))
        .route("/api/leads", get(leads::list_leads))
        .route("/api/leads/{email}", get(leads::lead_details))
        .route("/api/leads/{email}/generate-email", post(leads::generate_email))
        .route(
            "/api/leads/{email}/generate-response",
            post(leads::generate_response),
        )
        .route("/api/leads/{email}/send-email", post(leads::send_email))
        .route("/api/sender-configs", get(senders::list_senders))
        .route(
            "/api/sender-configs/{email}",
            put(senders::upsert_sender).delete(senders::delete_sender),
        )
        .route("/api/replies/check", post(check_replies))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn gateway_errors_map_to_statuses() {
        let validation: ApiError = GatewayError::from(ValidationError::Body(3)).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);

        let delivery: ApiError = GatewayError::Delivery {
            status: Some(422),
            reason: "bad".into(),
        }
        .into();
        assert_eq!(delivery.status, StatusCode::BAD_GATEWAY);

        let empty: ApiError = GatewayError::NoSenders.into();
        assert_eq!(empty.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_lead_is_not_found() {
        let err: ApiError = DatabaseError::NotFound {
            entity: "lead".into(),
            id: "a@x.com".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = ContentError::MissingDomain("a@x.com".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
