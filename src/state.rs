use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::job_queue::JobQueue;

/// Shared handle threaded through every axum handler and the auth middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub http: reqwest::Client,
    pub cipher: TokenCipher,
    pub config: Arc<Config>,
    pub queue: JobQueue,
}
