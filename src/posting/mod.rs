//! Posting Client
//!
//! Stateless HTTP client for the downstream posting service. The downstream
//! API is NOT idempotent; this client only maps transport outcomes faithfully
//! and never retries. Retry policy belongs to the queue, and deduplication
//! to the worker's GET-before-POST protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::transaction::Transaction;

/// Posting client error
#[derive(Error, Debug)]
pub enum PostingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status from posting service: {0}")]
    Status(u16),
}

/// Result of a downstream lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The downstream holds a record for this id
    Present(serde_json::Value),
    /// HTTP 404: no record for this id
    Absent,
}

impl Lookup {
    #[inline]
    pub fn is_present(&self) -> bool {
        matches!(self, Lookup::Present(_))
    }
}

/// Downstream posting service contract.
///
/// `get` distinguishes present/absent/error; `post` is success-or-error. An
/// error from `post` is ambiguous by nature: the record may or may not have
/// been written before the error surfaced. Callers resolve the ambiguity
/// with a follow-up `get`.
#[async_trait]
pub trait PostingClient: Send + Sync {
    async fn get(&self, id: &str) -> Result<Lookup, PostingError>;

    async fn post(&self, tx: &Transaction) -> Result<(), PostingError>;
}

/// reqwest-backed posting client with a bounded per-call timeout
pub struct HttpPostingClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: Option<(String, String)>,
}

impl HttpPostingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PostingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_header: None,
        })
    }

    /// Inject a static auth header on every call (collaborator option; the
    /// core contract is unauthenticated)
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header = Some((name.into(), value.into()));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_header {
            Some((name, value)) => req.header(name, value),
            None => req,
        }
    }
}

#[async_trait]
impl PostingClient for HttpPostingClient {
    async fn get(&self, id: &str) -> Result<Lookup, PostingError> {
        let url = self.url(&format!("/transactions/{}", id));
        let response = self.apply_auth(self.client.get(&url)).send().await?;

        match response.status() {
            StatusCode::OK => {
                let record = response.json::<serde_json::Value>().await?;
                Ok(Lookup::Present(record))
            }
            StatusCode::NOT_FOUND => Ok(Lookup::Absent),
            status => Err(PostingError::Status(status.as_u16())),
        }
    }

    async fn post(&self, tx: &Transaction) -> Result<(), PostingError> {
        let url = self.url("/transactions");
        let response = self.apply_auth(self.client.post(&url)).json(tx).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PostingError::Status(status.as_u16()))
        }
    }
}

/// Scriptable in-memory posting service for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockPostingClient {
        records: Mutex<HashMap<String, serde_json::Value>>,
        get_count: AtomicUsize,
        post_count: AtomicUsize,
        /// Every GET errors while true
        fail_get: Mutex<bool>,
        /// Next N POSTs error WITHOUT writing (pre-write failures)
        fail_post_remaining: Mutex<u32>,
        /// POST writes the record but still errors (post-write failure)
        fail_post_but_write: Mutex<bool>,
    }

    impl MockPostingClient {
        pub fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                get_count: AtomicUsize::new(0),
                post_count: AtomicUsize::new(0),
                fail_get: Mutex::new(false),
                fail_post_remaining: Mutex::new(0),
                fail_post_but_write: Mutex::new(false),
            }
        }

        /// Pre-seed a downstream record, as an operator posting directly would
        pub fn seed(&self, id: &str) {
            self.records
                .lock()
                .unwrap()
                .insert(id.to_string(), serde_json::json!({ "id": id }));
        }

        pub fn set_fail_get(&self, fail: bool) {
            *self.fail_get.lock().unwrap() = fail;
        }

        pub fn fail_next_posts(&self, n: u32) {
            *self.fail_post_remaining.lock().unwrap() = n;
        }

        pub fn set_fail_post_but_write(&self, fail: bool) {
            *self.fail_post_but_write.lock().unwrap() = fail;
        }

        pub fn contains(&self, id: &str) -> bool {
            self.records.lock().unwrap().contains_key(id)
        }

        pub fn get_count(&self) -> usize {
            self.get_count.load(Ordering::SeqCst)
        }

        pub fn post_count(&self) -> usize {
            self.post_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostingClient for MockPostingClient {
        async fn get(&self, id: &str) -> Result<Lookup, PostingError> {
            self.get_count.fetch_add(1, Ordering::SeqCst);

            if *self.fail_get.lock().unwrap() {
                return Err(PostingError::Status(503));
            }

            match self.records.lock().unwrap().get(id) {
                Some(record) => Ok(Lookup::Present(record.clone())),
                None => Ok(Lookup::Absent),
            }
        }

        async fn post(&self, tx: &Transaction) -> Result<(), PostingError> {
            self.post_count.fetch_add(1, Ordering::SeqCst);

            if *self.fail_post_but_write.lock().unwrap() {
                // The write lands, the ack is lost
                self.records
                    .lock()
                    .unwrap()
                    .insert(tx.id.clone(), serde_json::json!({ "id": tx.id }));
                return Err(PostingError::Status(502));
            }

            {
                let mut remaining = self.fail_post_remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PostingError::Status(503));
                }
            }

            self.records
                .lock()
                .unwrap()
                .insert(tx.id.clone(), serde_json::json!({ "id": tx.id }));
            Ok(())
        }
    }
}

#[cfg(test)]
pub use mock::MockPostingClient;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount: Decimal::from(5),
            currency: "USD".to_string(),
            description: "posting test".to_string(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_get_maps_200_to_present() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transactions/t1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"t1","amount":"5"}"#)
            .create_async()
            .await;

        let client =
            HttpPostingClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let lookup = client.get("t1").await.unwrap();
        assert!(lookup.is_present());
    }

    #[tokio::test]
    async fn test_get_maps_404_to_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transactions/missing")
            .with_status(404)
            .create_async()
            .await;

        let client =
            HttpPostingClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let lookup = client.get("missing").await.unwrap();
        assert!(!lookup.is_present());
    }

    #[tokio::test]
    async fn test_get_maps_5xx_to_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transactions/t1")
            .with_status(500)
            .create_async()
            .await;

        let client =
            HttpPostingClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = client.get("t1").await;
        assert!(matches!(result, Err(PostingError::Status(500))));
    }

    #[tokio::test]
    async fn test_post_success_and_error() {
        let mut server = mockito::Server::new_async().await;
        let ok_mock = server
            .mock("POST", "/transactions")
            .with_status(201)
            .create_async()
            .await;

        let client =
            HttpPostingClient::new(server.url(), Duration::from_secs(5)).unwrap();
        client.post(&sample_tx("t1")).await.unwrap();
        ok_mock.assert_async().await;

        let _err_mock = server
            .mock("POST", "/transactions")
            .with_status(503)
            .create_async()
            .await;
        let result = client.post(&sample_tx("t2")).await;
        assert!(matches!(result, Err(PostingError::Status(503))));
    }

    #[tokio::test]
    async fn test_auth_header_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/transactions/t1")
            .match_header("authorization", "Bearer sekrit")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpPostingClient::new(server.url(), Duration::from_secs(5))
            .unwrap()
            .with_auth_header("authorization", "Bearer sekrit");
        client.get("t1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mock_scripting() {
        let mock = MockPostingClient::new();
        let tx = sample_tx("m1");

        assert!(!mock.get("m1").await.unwrap().is_present());

        mock.fail_next_posts(1);
        assert!(mock.post(&tx).await.is_err());
        assert!(!mock.contains("m1"));

        mock.post(&tx).await.unwrap();
        assert!(mock.get("m1").await.unwrap().is_present());
        assert_eq!(mock.post_count(), 2);

        mock.set_fail_post_but_write(true);
        let tx2 = sample_tx("m2");
        assert!(mock.post(&tx2).await.is_err());
        assert!(mock.contains("m2"));
    }
}
