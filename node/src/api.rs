//! # REST API
//!
//! Builds the axum router that exposes the statement access flow over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                          |
//! |--------|-------------------------------|--------------------------------------|
//! | GET    | `/health`                     | Liveness check                       |
//! | GET    | `/status`                     | Node status summary                  |
//! | GET    | `/statements`                 | Cataloged statements (no locations)  |
//! | POST   | `/statements/send`            | Mail codes to registered contacts    |
//! | POST   | `/request-otp/:statement_id`  | Issue a code and mail it             |
//! | POST   | `/verify-otp`                 | Exchange a code for the file URL     |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use docgate::{
    BatchOutcome, CredentialStore, DeliveryState, GateDB, GateError, OtpIssuer, OtpVerifier,
    ResourceCatalog, ResourceId,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub issuer: Arc<OtpIssuer>,
    pub verifier: Arc<OtpVerifier>,
    /// Catalog and credential store. Handlers only read from it directly.
    pub db: Arc<GateDB>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/statements", get(statements_handler))
        .route("/statements/send", post(send_statements_handler))
        .route("/request-otp/:statement_id", post(request_otp_handler))
        .route("/verify-otp", post(verify_otp_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Number of cataloged statements.
    pub statements: usize,
    /// Credentials issued over the lifetime of the database.
    pub credentials_issued: usize,
    /// Credentials burned by a successful verification.
    pub credentials_consumed: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// One entry of `GET /statements`. The location and contact are withheld;
/// the location is only disclosed once a code has been verified.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatementSummary {
    pub id: ResourceId,
    pub title: String,
    pub date: NaiveDate,
    /// `sent` or `downloaded`; absent until a code has been issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryState>,
}

/// Body of `POST /statements/send`.
#[derive(Debug, Deserialize)]
pub struct SendStatementsBody {
    #[serde(alias = "statementIds")]
    pub statement_ids: Vec<ResourceId>,
}

/// Per-statement result of `POST /statements/send`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendResult {
    pub statement_id: ResourceId,
    /// `issued`, `no_contact` or `not_found`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<BatchOutcome> for SendResult {
    fn from(outcome: BatchOutcome) -> Self {
        let statement_id = outcome.resource_id();
        match outcome {
            BatchOutcome::Issued(handle) => SendResult {
                statement_id,
                outcome: "issued".into(),
                credential_id: Some(handle.credential_id),
                expires_at: Some(handle.expires_at),
            },
            BatchOutcome::NoContact { .. } => SendResult {
                statement_id,
                outcome: "no_contact".into(),
                credential_id: None,
                expires_at: None,
            },
            BatchOutcome::NotFound { .. } => SendResult {
                statement_id,
                outcome: "not_found".into(),
                credential_id: None,
                expires_at: None,
            },
        }
    }
}

/// Response payload for `POST /statements/send`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendStatementsResponse {
    pub message: String,
    pub results: Vec<SendResult>,
}

/// Body of `POST /request-otp/:statement_id`.
#[derive(Debug, Deserialize)]
pub struct RequestOtpBody {
    pub email: String,
}

/// Response payload for `POST /request-otp/:statement_id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestOtpResponse {
    pub message: String,
    pub credential_id: u64,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /verify-otp`.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpBody {
    pub statement_id: ResourceId,
    pub otp: String,
}

/// Response payload for `POST /verify-otp`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyOtpResponse {
    #[serde(rename = "fileUrl")]
    pub file_url: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `credential_expired`.
    pub error: String,
    pub message: String,
}

/// Maps library errors onto HTTP responses.
pub struct ApiError(GateError);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GateError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            err => {
                // Storage detail stays in the log.
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.public_message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        statements: state.db.resource_count(),
        credentials_issued: state.db.credential_count(),
        credentials_consumed: state.db.consumed_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `GET /statements` — lists the catalog, ordered by id.
async fn statements_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<StatementSummary>>, ApiError> {
    let resources = state.db.list().map_err(GateError::from)?;
    let mut statements = Vec::with_capacity(resources.len());
    for r in resources {
        let status = state.db.status_of(r.id).map_err(GateError::from)?;
        statements.push(StatementSummary {
            id: r.id,
            title: r.title,
            date: r.date,
            status: status.map(|s| s.state),
        });
    }
    Ok(Json(statements))
}

/// `POST /statements/send` — mails a fresh code for each listed statement
/// to the contact registered on it. Statements without a contact are
/// reported and skipped.
async fn send_statements_handler(
    State(state): State<AppState>,
    Json(body): Json<SendStatementsBody>,
) -> Result<Json<SendStatementsResponse>, ApiError> {
    let outcomes = state.issuer.issue_many(&body.statement_ids)?;
    let results: Vec<SendResult> = outcomes.into_iter().map(SendResult::from).collect();

    let issued = results.iter().filter(|r| r.credential_id.is_some()).count();
    state.metrics.credentials_issued_total.inc_by(issued as u64);

    Ok(Json(SendStatementsResponse {
        message: format!("Sent {issued} of {} statement(s)", results.len()),
        results,
    }))
}

/// `POST /request-otp/:statement_id` — issues a code for the statement and
/// hands it to the notifier. The code itself is never in the response.
async fn request_otp_handler(
    State(state): State<AppState>,
    Path(statement_id): Path<ResourceId>,
    Json(body): Json<RequestOtpBody>,
) -> Result<Json<RequestOtpResponse>, ApiError> {
    let handle = state.issuer.issue(statement_id, &body.email)?;
    state.metrics.credentials_issued_total.inc();

    Ok(Json(RequestOtpResponse {
        message: format!("OTP sent to {}", body.email.trim()),
        credential_id: handle.credential_id,
        expires_at: handle.expires_at,
    }))
}

/// `POST /verify-otp` — exchanges a valid code for the statement's file URL.
async fn verify_otp_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpBody>,
) -> Result<Json<VerifyOtpResponse>, ApiError> {
    let started = Instant::now();
    let result = state.verifier.verify(body.statement_id, &body.otp);
    state
        .metrics
        .verification_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(location) => {
            state.metrics.record_verification("success");
            Ok(Json(VerifyOtpResponse {
                file_url: location.to_string(),
            }))
        }
        Err(err) => {
            state.metrics.record_verification(err.code());
            tracing::info!(statement_id = body.statement_id, outcome = err.code(), "verification rejected");
            Err(err.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
