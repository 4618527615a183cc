//! Transaction Model and Lifecycle States
//!
//! Defines the client-submitted transaction, its validation, and the
//! per-transaction state record tracked across API, queue and workers.
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Transaction lifecycle status
///
/// Transitions follow the DAG:
///
/// ```text
/// PENDING → PROCESSING → COMPLETED
///                ↓    ↘
///           PROCESSING  FAILED      (processing → processing is the retry loop)
/// ```
///
/// Terminal states: COMPLETED (20), FAILED (-10). No transition leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TxStatus {
    /// Accepted and durably enqueued, not yet picked up by a worker
    Pending = 0,

    /// A worker holds the job and is executing the posting protocol
    Processing = 10,

    /// Terminal: the downstream service holds exactly one record for this id
    Completed = 20,

    /// Terminal: retries exhausted on pre-write failures
    Failed = -10,
}

impl TxStatus {
    /// Check if this is a terminal status (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Completed | TxStatus::Failed)
    }

    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TxStatus::Pending),
            10 => Some(TxStatus::Processing),
            20 => Some(TxStatus::Completed),
            -10 => Some(TxStatus::Failed),
            _ => None,
        }
    }

    /// Wire representation (lowercase, as served by the HTTP API)
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Processing => "processing",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }

    /// Whether the lifecycle DAG permits moving from `self` to `next`.
    ///
    /// `processing → processing` is permitted (retry loop).
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        match self {
            TxStatus::Pending => matches!(next, TxStatus::Processing),
            TxStatus::Processing => matches!(
                next,
                TxStatus::Processing | TxStatus::Completed | TxStatus::Failed
            ),
            TxStatus::Completed | TxStatus::Failed => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TxStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TxStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "pending" => Ok(TxStatus::Pending),
            "processing" => Ok(TxStatus::Processing),
            "completed" => Ok(TxStatus::Completed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(serde::de::Error::custom(format!(
                "unknown status: {}",
                other
            ))),
        }
    }
}

/// A validated transaction intent, immutable once accepted.
///
/// `id` is the client-chosen idempotency key: the unique name under which
/// at-most-once downstream effect is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Per-transaction state record, owned by the state store.
///
/// Mutated only by the worker pool after creation; two writers for the same
/// id never race (first-writer-wins create, per-id queue exclusion after).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub id: String,
    #[schema(value_type = String)]
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionState {
    /// Fresh record as written by the submission path
    pub fn pending(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: TxStatus::Pending,
            submitted_at: now,
            updated_at: now,
            completed_at: None,
            retry_count: 0,
            error: None,
        }
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationIssue {
    /// Field path, e.g. "amount"
    pub path: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: &'static str, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

/// Raw submission body (HTTP request deserialization)
///
/// This struct is used for HTTP API deserialization only. Business
/// validation and conversion to [`Transaction`] happen in [`Self::validate`],
/// the single source of truth for the schema; the handler and the tests both
/// go through it.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub id: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub description: Option<String>,
    /// ISO-8601 datetime, parsed during validation
    pub timestamp: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl SubmitRequest {
    /// Validate field-by-field and convert into a [`Transaction`].
    ///
    /// Collects every issue instead of stopping at the first, so the 400
    /// response can name all offending fields at once.
    pub fn validate(self) -> Result<Transaction, Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        let id = match self.id {
            Some(ref id) if !id.is_empty() => Some(id.clone()),
            Some(_) => {
                issues.push(ValidationIssue::new("id", "must not be empty"));
                None
            }
            None => {
                issues.push(ValidationIssue::new("id", "is required"));
                None
            }
        };

        let amount = match self.amount {
            Some(a) if a > Decimal::ZERO => Some(a),
            Some(_) => {
                issues.push(ValidationIssue::new("amount", "must be strictly positive"));
                None
            }
            None => {
                issues.push(ValidationIssue::new("amount", "is required"));
                None
            }
        };

        let currency = match self.currency {
            Some(ref c) if c.chars().count() == 3 => Some(c.clone()),
            Some(_) => {
                issues.push(ValidationIssue::new(
                    "currency",
                    "must be exactly 3 characters",
                ));
                None
            }
            None => {
                issues.push(ValidationIssue::new("currency", "is required"));
                None
            }
        };

        let description = match self.description {
            Some(ref d) if !d.is_empty() => Some(d.clone()),
            Some(_) => {
                issues.push(ValidationIssue::new("description", "must not be empty"));
                None
            }
            None => {
                issues.push(ValidationIssue::new("description", "is required"));
                None
            }
        };

        let timestamp = match self.timestamp {
            Some(ref ts) => match DateTime::parse_from_rfc3339(ts) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        "timestamp",
                        "must be an ISO-8601 datetime",
                    ));
                    None
                }
            },
            None => {
                issues.push(ValidationIssue::new("timestamp", "is required"));
                None
            }
        };

        if !issues.is_empty() {
            return Err(issues);
        }

        // All fields present when issues is empty
        Ok(Transaction {
            id: id.unwrap(),
            amount: amount.unwrap(),
            currency: currency.unwrap(),
            description: description.unwrap(),
            timestamp: timestamp.unwrap(),
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn valid_request() -> SubmitRequest {
        SubmitRequest {
            id: Some("tx-001".to_string()),
            amount: Some(Decimal::from_str("10.50").unwrap()),
            currency: Some("USD".to_string()),
            description: Some("coffee".to_string()),
            timestamp: Some("2025-01-01T00:00:00Z".to_string()),
            metadata: None,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(TxStatus::Completed.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
        assert!(!TxStatus::Pending.is_terminal());
        assert!(!TxStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_id_roundtrip() {
        for status in [
            TxStatus::Pending,
            TxStatus::Processing,
            TxStatus::Completed,
            TxStatus::Failed,
        ] {
            assert_eq!(TxStatus::from_id(status.id()), Some(status));
        }
        assert!(TxStatus::from_id(999).is_none());
    }

    #[test]
    fn test_transition_dag() {
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Processing));
        assert!(TxStatus::Processing.can_transition_to(TxStatus::Processing));
        assert!(TxStatus::Processing.can_transition_to(TxStatus::Completed));
        assert!(TxStatus::Processing.can_transition_to(TxStatus::Failed));

        // No shortcuts, no exits from terminal states
        assert!(!TxStatus::Pending.can_transition_to(TxStatus::Completed));
        assert!(!TxStatus::Pending.can_transition_to(TxStatus::Failed));
        assert!(!TxStatus::Completed.can_transition_to(TxStatus::Processing));
        assert!(!TxStatus::Failed.can_transition_to(TxStatus::Processing));
        assert!(!TxStatus::Completed.can_transition_to(TxStatus::Failed));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&TxStatus::Pending).unwrap(), "\"pending\"");
        let status: TxStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, TxStatus::Completed);
        assert!(serde_json::from_str::<TxStatus>("\"bogus\"").is_err());
    }

    #[test]
    fn test_validate_accepts_valid_request() {
        let tx = valid_request().validate().unwrap();
        assert_eq!(tx.id, "tx-001");
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.timestamp.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let req = SubmitRequest {
            id: None,
            amount: None,
            currency: None,
            description: None,
            timestamp: None,
            metadata: None,
        };
        let issues = req.validate().unwrap_err();
        assert_eq!(issues.len(), 5);
        assert!(issues.iter().any(|i| i.path == "id"));
        assert!(issues.iter().any(|i| i.path == "timestamp"));
    }

    #[test]
    fn test_validate_rejects_zero_and_negative_amount() {
        let mut req = valid_request();
        req.amount = Some(Decimal::ZERO);
        assert!(req.validate().is_err());

        let mut req = valid_request();
        req.amount = Some(Decimal::from_str("-1").unwrap());
        let issues = req.validate().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "amount");
    }

    #[test]
    fn test_validate_rejects_bad_currency() {
        let mut req = valid_request();
        req.currency = Some("USDT".to_string());
        assert!(req.validate().is_err());

        let mut req = valid_request();
        req.currency = Some("".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_timestamp() {
        let mut req = valid_request();
        req.timestamp = Some("yesterday".to_string());
        let issues = req.validate().unwrap_err();
        assert_eq!(issues[0].path, "timestamp");
    }

    #[test]
    fn test_validate_collects_multiple_issues() {
        let mut req = valid_request();
        req.id = Some("".to_string());
        req.description = Some("".to_string());
        let issues = req.validate().unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_transaction_deserializes_numeric_amount() {
        let json = r#"{"id":"t1","amount":10,"currency":"USD","description":"d","timestamp":"2025-01-01T00:00:00Z"}"#;
        let req: SubmitRequest = serde_json::from_str(json).unwrap();
        let tx = req.validate().unwrap();
        assert_eq!(tx.amount, Decimal::from(10));
    }

    #[test]
    fn test_state_wire_shape_is_camel_case() {
        let now = Utc::now();
        let state = TransactionState::pending("t1", now);
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("submittedAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("retryCount").is_some());
        // Unset optionals are omitted, not null
        assert!(value.get("completedAt").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_metadata_round_trip() {
        let json = r#"{"id":"t1","amount":"2.5","currency":"EUR","description":"d",
                       "timestamp":"2025-01-01T00:00:00Z","metadata":{"source":"pos-7","batch":42}}"#;
        let req: SubmitRequest = serde_json::from_str(json).unwrap();
        let tx = req.validate().unwrap();
        let meta = tx.metadata.as_ref().unwrap();
        assert_eq!(meta.get("source").unwrap(), "pos-7");

        let encoded = serde_json::to_value(&tx).unwrap();
        assert_eq!(encoded["metadata"]["batch"], 42);
    }
}
