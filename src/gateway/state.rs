use std::sync::Arc;

use super::service::SubmissionService;

/// Shared application state for the HTTP gateway
#[derive(Clone)]
pub struct AppState {
    pub submission: Arc<SubmissionService>,
}

impl AppState {
    pub fn new(submission: Arc<SubmissionService>) -> Self {
        Self { submission }
    }
}
