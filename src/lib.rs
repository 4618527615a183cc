//! txgate - Transaction Ingestion Gateway
//!
//! Accepts transaction intents over HTTP, acknowledges them within a tight
//! latency budget, and asynchronously posts each one to a downstream
//! posting service whose native API is not idempotent. Every accepted
//! transaction appears exactly once downstream or is reported failed.
//!
//! # Modules
//!
//! - [`transaction`] - Transaction model, validation, lifecycle states
//! - [`store`] - Per-transaction state records (PostgreSQL KV with TTL)
//! - [`queue`] - Durable work queue (dedup, leases, backoff, quarantine)
//! - [`posting`] - HTTP client for the downstream posting service
//! - [`worker`] - Worker pool running the GET-before-POST protocol
//! - [`gateway`] - HTTP ingestion API
//! - [`config`] - YAML configuration with env overrides

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod posting;
pub mod queue;
pub mod store;
pub mod transaction;
pub mod worker;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use error::GatewayError;
pub use queue::{EnqueueOutcome, JobState, QueueMetrics, ReservedJob, WorkQueue};
pub use store::StateStore;
pub use transaction::{SubmitRequest, Transaction, TransactionState, TxStatus};
pub use worker::{AttemptOutcome, PoolConfig, WorkerPool};
