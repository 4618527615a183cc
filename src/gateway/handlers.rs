//! HTTP handlers for the ingestion API

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use super::service::SubmitDisposition;
use super::state::AppState;
use super::types::{
    HealthResponse, QueueHealth, ServicesHealth, StatusResponse, ValidationErrorResponse,
};
use crate::error::GatewayError;
use crate::transaction::{SubmitRequest, ValidationIssue};

/// Submit a transaction intent
///
/// Accepts within the latency budget and processes asynchronously; replays
/// of an already-accepted id are acknowledged without re-enqueueing.
#[utoipa::path(
    post,
    path = "/api/transactions",
    request_body = SubmitRequest,
    responses(
        (status = 202, description = "Accepted for processing", body = StatusResponse),
        (status = 200, description = "Already processed (terminal replay)", body = StatusResponse),
        (status = 400, description = "Validation failed", body = ValidationErrorResponse),
        (status = 503, description = "State store or queue unavailable")
    ),
    tag = "Transactions"
)]
pub async fn submit_transaction(
    State(state): State<AppState>,
    req: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match req {
        Ok(req) => req,
        Err(rejection) => {
            // A body that does not even deserialize is a validation failure
            return (
                StatusCode::BAD_REQUEST,
                Json(ValidationErrorResponse::new(vec![ValidationIssue {
                    path: "body",
                    message: rejection.body_text(),
                }])),
            )
                .into_response();
        }
    };

    match state.submission.submit(req).await {
        Ok(SubmitDisposition::Accepted(accepted)) => (
            StatusCode::ACCEPTED,
            Json(StatusResponse::from_state(accepted, None)),
        )
            .into_response(),
        Ok(SubmitDisposition::AlreadyQueued(observed)) => (
            StatusCode::ACCEPTED,
            Json(StatusResponse::from_state(observed, Some("already queued"))),
        )
            .into_response(),
        Ok(SubmitDisposition::AlreadyProcessed(terminal)) => (
            StatusCode::OK,
            Json(StatusResponse::from_state(terminal, Some("already processed"))),
        )
            .into_response(),
        Ok(SubmitDisposition::Invalid(issues)) => (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse::new(issues)),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get the current state of a transaction
#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    params(("id" = String, Path, description = "Transaction id (idempotency key)")),
    responses(
        (status = 200, description = "Current transaction state", body = StatusResponse),
        (status = 404, description = "No record for this id")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, GatewayError> {
    let tx_state = state.submission.status(&id).await?;
    Ok(Json(StatusResponse::from_state(tx_state, None)))
}

/// Health check endpoint
///
/// Reports the backing store and queue. 503 when the state store is
/// unreachable; queue metrics are included when available.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "State store unreachable", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let snapshot = state.submission.health().await;

    let body = HealthResponse {
        status: if snapshot.store_healthy { "ok" } else { "unavailable" },
        timestamp: Utc::now(),
        services: ServicesHealth {
            store: if snapshot.store_healthy { "up" } else { "down" },
            queue: QueueHealth {
                status: if snapshot.queue_metrics.is_some() { "up" } else { "down" },
                metrics: snapshot.queue_metrics,
            },
        },
    };

    let status = if snapshot.store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}
