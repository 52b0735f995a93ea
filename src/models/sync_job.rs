use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJob {
    pub id: Uuid,
    pub user_id: String,
    pub connection_id: Uuid,
    pub provider: String,
    pub sync_type: String,
    pub status: String,
    pub priority: i32,
    pub progress: i32,
    pub folders_completed: i32,
    pub total_folders: i32,
    pub messages_synced: i32,
    pub current_folder: Option<String>,
    pub status_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub latest_history_id: Option<String>,
    pub worker_id: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    Full,
    Incremental,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub hostname: String,
    pub status: String,
    pub last_heartbeat: DateTime<Utc>,
    pub current_job_id: Option<Uuid>,
    pub current_memory_usage: Option<i64>,
    pub jobs_processed_count: i32,
    pub started_at: DateTime<Utc>,
}

/// Row in `sync_locks`. Acquired by `INSERT ... ON CONFLICT DO NOTHING` and
/// released by deleting the row; a stale lock is reclaimed once `expires_at`
/// has passed, which is why that column (not `acquired_at`) gates acquisition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistLock {
    pub id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
