//! Submission Service
//!
//! The ingestion path behind the HTTP handlers. Guarantees that after a
//! submit call returns, either the transaction is durably enqueued with a
//! `pending` state record, an existing outcome is surfaced, or the caller
//! saw an error and nothing was accepted.
//!
//! Kept free of axum types so the same path is driven by the handlers and
//! by the end-to-end tests.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use crate::error::GatewayError;
use crate::queue::{QueueMetrics, WorkQueue};
use crate::store::StateStore;
use crate::transaction::{SubmitRequest, TransactionState, ValidationIssue};

/// How a submission resolved. Duplicates are dispositions, not errors.
#[derive(Debug)]
pub enum SubmitDisposition {
    /// Fresh acceptance: state created as pending, job enqueued
    Accepted(TransactionState),
    /// A live record already exists; nothing was re-enqueued
    AlreadyQueued(TransactionState),
    /// The transaction already reached a terminal status
    AlreadyProcessed(TransactionState),
    /// Schema validation failed; no side effects
    Invalid(Vec<ValidationIssue>),
}

/// Health snapshot for the health endpoint
#[derive(Debug)]
pub struct HealthSnapshot {
    pub store_healthy: bool,
    pub queue_metrics: Option<QueueMetrics>,
}

pub struct SubmissionService {
    store: Arc<StateStore>,
    queue: Arc<WorkQueue>,
}

impl SubmissionService {
    pub fn new(store: Arc<StateStore>, queue: Arc<WorkQueue>) -> Self {
        Self { store, queue }
    }

    /// Accept a transaction intent idempotently.
    ///
    /// The create is a first-writer-wins CAS; losing the race means someone
    /// else accepted the same id and the observed status is surfaced
    /// instead. Enqueue is idempotent by job id, so a duplicate submit
    /// during the retry window is a no-op.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitDisposition, GatewayError> {
        let tx = match req.validate() {
            Ok(tx) => tx,
            Err(issues) => return Ok(SubmitDisposition::Invalid(issues)),
        };

        if let Some(state) = self.store.get(&tx.id).await?
            && state.status.is_terminal()
        {
            debug!(tx_id = %tx.id, status = %state.status, "Replay of terminal transaction");
            return Ok(SubmitDisposition::AlreadyProcessed(state));
        }

        let state = TransactionState::pending(tx.id.clone(), Utc::now());
        if !self.store.create_if_absent(&state).await? {
            // Lost the creation race; report whatever the winner produced
            let observed = self.store.get(&tx.id).await?.unwrap_or(state);
            if observed.status.is_terminal() {
                return Ok(SubmitDisposition::AlreadyProcessed(observed));
            }
            debug!(tx_id = %tx.id, status = %observed.status, "Duplicate submission, already queued");
            return Ok(SubmitDisposition::AlreadyQueued(observed));
        }

        if let Err(e) = self.queue.enqueue(&tx.id, &tx).await {
            // The pending record alone has no downstream effect; it dies by
            // TTL, so surfacing the outage cannot create a duplicate.
            error!(tx_id = %tx.id, error = %e, "Enqueue failed after state creation, orphan pending record");
            return Err(e);
        }

        Ok(SubmitDisposition::Accepted(state))
    }

    /// Current state for an id. Read-only.
    pub async fn status(&self, id: &str) -> Result<TransactionState, GatewayError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    /// Probe the backing services for the health endpoint
    pub async fn health(&self) -> HealthSnapshot {
        let store_healthy = self.store.ping().await.is_ok();
        let queue_metrics = match self.queue.metrics().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                error!(error = %e, "Queue metrics unavailable");
                None
            }
        };

        HealthSnapshot {
            store_healthy,
            queue_metrics,
        }
    }
}
