use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::SyncJob;

/// A view over `sync_jobs`: claim, heartbeat, complete, fail, cancel, and
/// reclaim-abandoned, all expressed as conditional updates so the database
/// itself is the queue.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        user_id: &str,
        connection_id: Uuid,
        provider: &str,
        sync_type: &str,
        priority: i32,
    ) -> Result<SyncJob, SyncError> {
        if let Some(existing) = self.find_in_progress_for_connection(connection_id).await? {
            return Err(SyncError::ConflictingJobInProgress { existing_job_id: existing.id });
        }

        sqlx::query_as::<_, SyncJob>(
            r#"INSERT INTO sync_jobs (user_id, connection_id, provider, sync_type, status, priority)
               VALUES ($1, $2, $3, $4, 'in_progress', $5)
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(provider)
        .bind(sync_type)
        .bind(priority)
        .fetch_one(&self.pool)
        .await
        .map_err(SyncError::from)
    }

    async fn find_in_progress_for_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<SyncJob>, SyncError> {
        sqlx::query_as::<_, SyncJob>(
            "SELECT * FROM sync_jobs WHERE connection_id = $1 AND status = 'in_progress' LIMIT 1",
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::from)
    }

    /// Selects candidate rows ordered deterministically, then attempts a
    /// conditional `worker_id IS NULL` update per row — only rows whose
    /// update affected exactly one row are considered claimed, which is what
    /// makes this safe under concurrent callers without row-level locking.
    pub async fn claim_next(&self, worker_id: &str, max: i64) -> Result<Vec<SyncJob>, SyncError> {
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM sync_jobs
               WHERE status = 'in_progress' AND worker_id IS NULL
               ORDER BY priority DESC, started_at ASC, id ASC
               LIMIT $1"#,
        )
        .bind(max)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let job = sqlx::query_as::<_, SyncJob>(
                r#"UPDATE sync_jobs SET worker_id = $2, updated_at = now()
                   WHERE id = $1 AND worker_id IS NULL
                   RETURNING *"#,
            )
            .bind(id)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(job) = job {
                claimed.push(job);
                if claimed.len() as i64 >= max {
                    break;
                }
            }
        }
        Ok(claimed)
    }

    /// Claims jobs whose owner has gone silent (`updated_at` stale past the
    /// lock timeout), annotating the reassignment on `status_message`.
    pub async fn reclaim_abandoned(
        &self,
        worker_id: &str,
        lock_timeout: Duration,
        max: i64,
    ) -> Result<Vec<SyncJob>, SyncError> {
        let lock_timeout_secs = lock_timeout.num_seconds().to_string();
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM sync_jobs
               WHERE status = 'in_progress' AND worker_id IS NOT NULL
                 AND updated_at < now() - ($1 || ' seconds')::interval
               ORDER BY priority DESC, started_at ASC, id ASC
               LIMIT $2"#,
        )
        .bind(&lock_timeout_secs)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let job = sqlx::query_as::<_, SyncJob>(
                r#"UPDATE sync_jobs SET
                     worker_id = $2,
                     status_message = 'reassigned after previous worker went silent',
                     updated_at = now()
                   WHERE id = $1 AND status = 'in_progress'
                     AND updated_at < now() - ($3 || ' seconds')::interval
                   RETURNING *"#,
            )
            .bind(id)
            .bind(worker_id)
            .bind(&lock_timeout_secs)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(job) = job {
                reclaimed.push(job);
            }
        }
        Ok(reclaimed)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn report_progress_fields(
        &self,
        job_id: Uuid,
        progress: i32,
        folders_completed: i32,
        total_folders: i32,
        messages_synced: i32,
        current_folder: Option<String>,
        status_message: Option<String>,
    ) -> Result<(), SyncError> {
        sqlx::query(
            r#"UPDATE sync_jobs SET
                 progress = $2, folders_completed = $3, total_folders = $4, messages_synced = $5,
                 current_folder = $6, status_message = COALESCE($7, status_message), updated_at = now()
               WHERE id = $1 AND status = 'in_progress'"#,
        )
        .bind(job_id)
        .bind(progress)
        .bind(folders_completed)
        .bind(total_folders)
        .bind(messages_synced)
        .bind(current_folder)
        .bind(status_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: Uuid, latest_history_id: Option<&str>) -> Result<(), SyncError> {
        sqlx::query(
            r#"UPDATE sync_jobs SET
                 status = 'completed', progress = 100, completed_at = now(),
                 latest_history_id = COALESCE($2, latest_history_id), updated_at = now()
               WHERE id = $1 AND status = 'in_progress'"#,
        )
        .bind(job_id)
        .bind(latest_history_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), SyncError> {
        sqlx::query(
            r#"UPDATE sync_jobs SET
                 status = 'failed', status_message = $2, completed_at = now(), updated_at = now()
               WHERE id = $1 AND status = 'in_progress'"#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cancel(&self, user_id: &str, job_id: Uuid) -> Result<bool, SyncError> {
        let result = sqlx::query(
            r#"UPDATE sync_jobs SET status = 'cancelled', completed_at = now(), updated_at = now()
               WHERE id = $1 AND user_id = $2 AND status = 'in_progress'"#,
        )
        .bind(job_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_cancelled(&self, job_id: Uuid) -> Result<bool, SyncError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM sync_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status.as_deref() == Some("cancelled"))
    }

    /// Releases a single claimed job back to the pool without changing its
    /// status, so another worker can pick it up on its next poll. Used when
    /// a claimed job turns out to be un-runnable right now (e.g. its
    /// connection's sync latch is already held) rather than actually failed.
    pub async fn release(&self, job_id: Uuid) -> Result<(), SyncError> {
        sqlx::query("UPDATE sync_jobs SET worker_id = NULL, updated_at = now() WHERE id = $1 AND status = 'in_progress'")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// On worker shutdown: release every in_progress job back to the pool
    /// without changing its status, so another worker can reclaim it immediately.
    pub async fn release_all(&self, worker_id: &str) -> Result<u64, SyncError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET worker_id = NULL, updated_at = now() WHERE worker_id = $1 AND status = 'in_progress'",
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(&self, user_id: &str, job_id: Uuid) -> Result<Option<SyncJob>, SyncError> {
        sqlx::query_as::<_, SyncJob>("SELECT * FROM sync_jobs WHERE id = $1 AND user_id = $2")
            .bind(job_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::from)
    }

    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<SyncJob>, SyncError> {
        sqlx::query_as::<_, SyncJob>(
            "SELECT * FROM sync_jobs WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::from)
    }
}
