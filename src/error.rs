use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Typed error surface for the sync orchestration core.
///
/// Variants that change caller behavior (vs. merely being logged) get their own
/// case; everything else collapses into `Store`/`Provider`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("provider token revoked: {0}")]
    ProviderTokenRevoked(String),

    #[error("token refresh failed transiently: {0}")]
    TokenRefreshTransient(String),

    #[error("provider rate limit exceeded after retries")]
    RateLimitExceeded,

    #[error("history cursor is no longer valid")]
    InvalidHistoryCursor,

    #[error("a sync job is already in progress for this connection")]
    ConflictingJobInProgress { existing_job_id: uuid::Uuid },

    #[error("connection not found")]
    ConnectionNotFound,

    #[error("job was cancelled")]
    JobCancelled,

    #[error("folder not found")]
    FolderNotFound,

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("provider error: {0}")]
    Provider(String),
}

impl SyncError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::ProviderTokenRevoked(_) => StatusCode::UNAUTHORIZED,
            SyncError::TokenRefreshTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            SyncError::InvalidHistoryCursor => StatusCode::CONFLICT,
            SyncError::ConflictingJobInProgress { .. } => StatusCode::OK,
            SyncError::ConnectionNotFound | SyncError::FolderNotFound => StatusCode::NOT_FOUND,
            SyncError::JobCancelled => StatusCode::CONFLICT,
            SyncError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if let SyncError::ConflictingJobInProgress { existing_job_id } = &self {
            return (
                status,
                Json(json!({ "data": { "syncId": existing_job_id, "alreadyRunning": true } })),
            )
                .into_response();
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// A `PartialFolderFailure` is never propagated as an error — it is recorded on the
/// job's `status_message` and swallowed so the remaining folders still run. Modeled
/// as a plain struct rather than a `SyncError` variant since nothing downstream
/// needs to pattern-match on it.
#[derive(Debug)]
pub struct PartialFolderFailure {
    pub folder_name: String,
    pub reason: String,
}

impl std::fmt::Display for PartialFolderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "folder '{}' failed: {}", self.folder_name, self.reason)
    }
}
