//! Gateway Error Types
//!
//! One error type spans the submission path, the state store and the queue;
//! error codes are stable strings for API responses.

use thiserror::Error;

/// Gateway error
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Backing store (state/queue) unreachable or erroring
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Get the stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::Unavailable(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }
}

// A backing-store failure during submission must surface as 503 with no
// partial state, never as a generic 500.
impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("payload encoding: {}", e))
    }
}
