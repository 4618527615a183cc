//! Worker Pool
//!
//! Bounded concurrent consumers that reserve jobs from the queue and execute
//! the posting protocol against the non-idempotent downstream:
//!
//! 1. enter `processing`
//! 2. GET-before-POST (dedup against prior attempts / replays / pre-seeds)
//! 3. POST
//! 4. on POST error: wait `base * 2^attempt`, then GET again. A visible
//!    record means the write landed and the error was post-write; complete,
//!    never re-POST
//! 5. otherwise retry with backoff until the attempt budget is spent
//!
//! # Safety Invariants
//!
//! 1. **Verify-Before-Retry**: a failed POST is never retried until a GET has
//!    shown the downstream holds no record
//! 2. **Conservative verification**: an error on the verification GET counts
//!    as pre-write; an extra attempt is safe, a duplicate POST is not
//! 3. **No mid-protocol cancellation**: shutdown is honored between jobs only
//! 4. Workers never terminate on a job error; failures become state updates
//!    and nacks

#[cfg(test)]
mod integration_tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::GatewayError;
use crate::posting::{Lookup, PostingClient};
use crate::queue::{ReservedJob, WorkQueue, backoff_delay};
use crate::store::StateStore;
use crate::transaction::TxStatus;

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Total attempts per job including the first
    pub max_retries: u32,
    /// Backoff base, shared by retry scheduling and the verification wait
    pub backoff_base: Duration,
    /// Idle sleep between empty reservation polls
    pub poll_interval: Duration,
}

impl From<&QueueConfig> for PoolConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.worker_concurrency,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Outcome of one execution of the posting protocol for a job.
///
/// Explicit tags instead of errors-as-control-flow: the queue interface
/// consumes these directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The downstream holds exactly one record for this id
    Completed,
    /// Pre-write failure; safe to retry after backoff
    RetryPreWrite(String),
    /// Attempt budget spent on pre-write failures; quarantine
    TerminalFailure(String),
}

/// Decide retry vs terminal failure after a confirmed pre-write failure.
///
/// `attempt` is zero-based; `max_retries` counts total attempts including
/// the first, so the last permitted execution is `attempt = max_retries - 1`.
fn resolve_pre_write_failure(attempt: u32, max_retries: u32, cause: String) -> AttemptOutcome {
    if attempt + 1 < max_retries {
        AttemptOutcome::RetryPreWrite(cause)
    } else {
        AttemptOutcome::TerminalFailure(format!("max retries exceeded: {}", cause))
    }
}

/// Worker pool driving the posting protocol
pub struct WorkerPool {
    store: Arc<StateStore>,
    queue: Arc<WorkQueue>,
    posting: Arc<dyn PostingClient>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<StateStore>,
        queue: Arc<WorkQueue>,
        posting: Arc<dyn PostingClient>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            queue,
            posting,
            config,
        }
    }

    /// Spawn the configured number of workers.
    ///
    /// Each worker runs until the shutdown signal flips, finishing its
    /// current job first.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            concurrency = self.config.concurrency,
            max_retries = self.config.max_retries,
            "Starting worker pool"
        );

        (0..self.config.concurrency)
            .map(|n| {
                let pool = Arc::clone(&self);
                let shutdown = shutdown.clone();
                let worker_id = format!("worker-{}-{}", n, uuid::Uuid::new_v4().simple());
                tokio::spawn(async move {
                    pool.run_worker(&worker_id, shutdown).await;
                })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %worker_id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once(worker_id).await {
                Ok(true) => {
                    // Processed a job; poll again immediately
                }
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(worker = %worker_id, error = %e, "Reservation failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!(worker = %worker_id, "Worker stopped");
    }

    /// Reserve and process at most one job. Returns whether a job was
    /// processed. Exposed for single-stepping in tests and operations.
    pub async fn run_once(&self, worker_id: &str) -> Result<bool, GatewayError> {
        let Some(job) = self.queue.reserve(worker_id).await? else {
            return Ok(false);
        };

        self.handle_job(&job).await;
        Ok(true)
    }

    /// Convert one protocol attempt into state updates and an ack/nack.
    ///
    /// Every error path ends in a nack, never a worker exit.
    async fn handle_job(&self, job: &ReservedJob) {
        debug!(tx_id = %job.id, attempt = job.attempt, "Processing job");

        match self.run_attempt(job).await {
            Ok(AttemptOutcome::Completed) => {
                if let Err(e) = self.store.mark_completed(&job.id).await {
                    // The downstream effect is done but the state write was
                    // lost; redeliver, the next attempt resolves via its GET.
                    warn!(tx_id = %job.id, error = %e, "State write failed after completion, redelivering");
                    self.nack_quietly(job, true, "state store failure after completion").await;
                    return;
                }

                match self.queue.ack(job).await {
                    Ok(true) => {
                        info!(tx_id = %job.id, attempt = job.attempt, "Transaction completed");
                    }
                    Ok(false) => {
                        warn!(tx_id = %job.id, "Lease lost before ack; redelivery will dedup via GET");
                    }
                    Err(e) => {
                        error!(tx_id = %job.id, error = %e, "Ack failed");
                    }
                }
            }
            Ok(AttemptOutcome::RetryPreWrite(cause)) => {
                warn!(
                    tx_id = %job.id,
                    attempt = job.attempt,
                    cause = %cause,
                    "Attempt failed pre-write, scheduling retry"
                );
                if let Err(e) = self
                    .store
                    .record_retry(&job.id, job.attempt + 1, &cause)
                    .await
                {
                    warn!(tx_id = %job.id, error = %e, "Failed to record retry state");
                }
                self.nack_quietly(job, true, &cause).await;
            }
            Ok(AttemptOutcome::TerminalFailure(cause)) => {
                error!(
                    tx_id = %job.id,
                    attempt = job.attempt,
                    cause = %cause,
                    "Transaction failed terminally"
                );
                let retry_count = (job.attempt + 1).min(self.config.max_retries);
                if let Err(e) = self.store.mark_failed(&job.id, retry_count, &cause).await {
                    warn!(tx_id = %job.id, error = %e, "Failed to record terminal state");
                }
                self.nack_quietly(job, false, &cause).await;
            }
            Err(e) => {
                // Local/store fault, not a downstream verdict: retry. The
                // attempt counter still advances, so this stays bounded.
                warn!(tx_id = %job.id, error = %e, "Attempt aborted by infrastructure error, retrying");
                self.nack_quietly(job, true, &e.to_string()).await;
            }
        }
    }

    /// One execution of the posting protocol. Strictly sequential; the only
    /// waits are bounded HTTP calls and the verification backoff.
    async fn run_attempt(&self, job: &ReservedJob) -> Result<AttemptOutcome, GatewayError> {
        // Step 1: enter processing
        if !self.store.mark_processing(&job.id, job.attempt).await? {
            // Redelivered after a terminal transition (or the record lapsed).
            return match self.store.get(&job.id).await? {
                Some(state) if state.status == TxStatus::Completed => {
                    debug!(tx_id = %job.id, "Already completed, acking replayed job");
                    Ok(AttemptOutcome::Completed)
                }
                Some(state) if state.status == TxStatus::Failed => Ok(
                    AttemptOutcome::TerminalFailure(
                        state.error.unwrap_or_else(|| "already failed".to_string()),
                    ),
                ),
                _ => {
                    // State record gone (TTL) while the job survived; the
                    // downstream effect still governs, continue the protocol.
                    warn!(tx_id = %job.id, "No live state record for job, continuing");
                    Ok(self.post_with_verification(job).await)
                }
            };
        }

        Ok(self.post_with_verification(job).await)
    }

    /// Steps 2-5: dedup GET, POST, post-failure verification, retry decision.
    async fn post_with_verification(&self, job: &ReservedJob) -> AttemptOutcome {
        // Step 2: GET-before-POST. A visible record means a prior attempt
        // (or an external writer) already posted this id.
        match self.posting.get(&job.id).await {
            Ok(Lookup::Present(_)) => {
                debug!(tx_id = %job.id, "Record already downstream, deduplicated");
                return AttemptOutcome::Completed;
            }
            Ok(Lookup::Absent) => {}
            Err(e) => {
                return resolve_pre_write_failure(
                    job.attempt,
                    self.config.max_retries,
                    format!("GET failed: {}", e),
                );
            }
        }

        // Step 3: POST
        let post_err = match self.posting.post(&job.payload).await {
            Ok(()) => return AttemptOutcome::Completed,
            Err(e) => e,
        };

        // Step 4: the POST error is ambiguous. Give the downstream time to
        // make a landed write visible (and damp retry storms), then look.
        tokio::time::sleep(backoff_delay(self.config.backoff_base, job.attempt)).await;

        match self.posting.get(&job.id).await {
            Ok(Lookup::Present(_)) => {
                // Post-write failure: the effect occurred exactly once.
                info!(tx_id = %job.id, "POST error was post-write, record is downstream");
                AttemptOutcome::Completed
            }
            Ok(Lookup::Absent) => resolve_pre_write_failure(
                job.attempt,
                self.config.max_retries,
                format!("POST failed: {}", post_err),
            ),
            Err(verify_err) => resolve_pre_write_failure(
                job.attempt,
                self.config.max_retries,
                format!(
                    "POST failed: {}; verification GET failed: {}",
                    post_err, verify_err
                ),
            ),
        }
    }

    async fn nack_quietly(&self, job: &ReservedJob, retryable: bool, cause: &str) {
        if let Err(e) = self.queue.nack(job, retryable, cause).await {
            error!(tx_id = %job.id, error = %e, "Nack failed; lease expiry will redeliver");
        }
    }
}
