//! Gateway wire types
//!
//! Response shapes served by the HTTP API, plus the error-to-response
//! mapping. All timestamps are ISO-8601; field names are camelCase.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::GatewayError;
use crate::queue::QueueMetrics;
use crate::transaction::{TransactionState, TxStatus, ValidationIssue};

/// Body served on submission acceptance, replays, and status reads
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: String,
    #[schema(value_type = String)]
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present on duplicate submissions ("already queued" / "already processed")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl StatusResponse {
    pub fn from_state(state: TransactionState, message: Option<&'static str>) -> Self {
        Self {
            id: state.id,
            status: state.status,
            submitted_at: state.submitted_at,
            completed_at: state.completed_at,
            retry_count: state.retry_count,
            error: state.error,
            message,
        }
    }
}

/// 400 body listing every offending field
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationErrorResponse {
    pub error: &'static str,
    pub details: Vec<ValidationIssue>,
}

impl ValidationErrorResponse {
    pub fn new(details: Vec<ValidationIssue>) -> Self {
        Self {
            error: "Validation failed",
            details,
        }
    }
}

/// Generic error body with a stable code
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 5xx detail stays server-side; the client gets a generic message
        let message = match &self {
            GatewayError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error on HTTP path");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: self.code(),
        });

        (status, body).into_response()
    }
}

/// Health endpoint body
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServicesHealth,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServicesHealth {
    pub store: &'static str,
    pub queue: QueueHealth,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QueueMetrics>,
}
