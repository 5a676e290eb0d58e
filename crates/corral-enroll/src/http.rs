//! Enrollment HTTP route handlers.
//!
//! Routes are mounted at the server root. Handlers delegate to
//! `EnrollState` domain methods (shared with the facade). Errors are JSON
//! `{"error": code, "message": text}` bodies; successes are text, JSON, or
//! a file stream depending on the route.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tokio_util::io::ReaderStream;

use corral_common::error::ErrorCode;

use crate::error::EnrollError;
use crate::protocol::ApproveResponse;
use crate::EnrollState;

const PEM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const TOOL_CONTENT_TYPE: &str = "application/octet-stream";

pub(crate) fn routes(state: Arc<EnrollState>) -> Router {
    Router::new()
        .route("/sign/:token/:role", put(sign_handler))
        .route("/cacert", get(cacert_handler))
        .route("/cert/:token/:fingerprint", get(cert_handler))
        .route("/download/:tool", get(download_handler))
        .route("/requests/:token", get(requests_handler))
        .route("/approve/:token/:fingerprint", post(approve_handler))
        .with_state(state)
}

/// PUT /sign/{token}/{role}: Submit a CSR for the given role.
async fn sign_handler(
    State(state): State<Arc<EnrollState>>,
    Path((token, role)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    match state.submit(&token, &role, &body).await {
        Ok(submitted) => (StatusCode::CREATED, Json(submitted)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /cacert: The CA certificate, one PEM block.
async fn cacert_handler(State(state): State<Arc<EnrollState>>) -> Response {
    match state.ca_cert().await {
        Ok(pem) => pem_response(pem),
        Err(e) => error_response(&e),
    }
}

/// GET /cert/{token}/{fingerprint}: Signed certificate once approved.
async fn cert_handler(
    State(state): State<Arc<EnrollState>>,
    Path((token, fingerprint)): Path<(String, String)>,
) -> Response {
    match state.issue(&token, &fingerprint).await {
        Ok(pem) => pem_response(pem),
        Err(e) => error_response(&e),
    }
}

/// GET /download/{tool}: Stream an allow-listed tool binary.
async fn download_handler(
    State(state): State<Arc<EnrollState>>,
    Path(tool): Path<String>,
) -> Response {
    let file = match state.tools.open(&tool).await {
        Ok(file) => file,
        Err(EnrollError::Io(e)) => {
            tracing::error!(tool = %tool, error = %e, "Cannot open tool");
            return error_response(&EnrollError::Io(e));
        }
        Err(e) => {
            tracing::debug!(tool = %tool, error = %e, "Refused tool download");
            return error_response(&e);
        }
    };

    tracing::info!(tool = %tool, "Serving tool download");
    let body = Body::from_stream(ReaderStream::new(file));
    ([(header::CONTENT_TYPE, TOOL_CONTENT_TYPE)], body).into_response()
}

/// GET /requests/{token}: All known signing requests.
async fn requests_handler(
    State(state): State<Arc<EnrollState>>,
    Path(token): Path<String>,
) -> Response {
    if let Err(e) = state.authorize(&token) {
        return error_response(&e);
    }
    Json(state.requests().await).into_response()
}

/// POST /approve/{token}/{fingerprint}: Approve a pending request.
async fn approve_handler(
    State(state): State<Arc<EnrollState>>,
    Path((token, fingerprint)): Path<(String, String)>,
) -> Response {
    if let Err(e) = state.authorize(&token) {
        return error_response(&e);
    }
    match state.approve(&fingerprint).await {
        Ok(()) => Json(ApproveResponse {
            fingerprint,
            approved: true,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

fn pem_response(pem: String) -> Response {
    ([(header::CONTENT_TYPE, PEM_CONTENT_TYPE)], pem).into_response()
}

pub(crate) fn error_response(error: &EnrollError) -> Response {
    let code = ErrorCode::from(error);
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "error": code,
        "message": error.to_string(),
    });
    (status, Json(body)).into_response()
}
