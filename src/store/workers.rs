use sqlx::PgPool;
use uuid::Uuid;

use crate::models::WorkerRecord;

pub async fn register(pool: &PgPool, worker_id: &str, hostname: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO worker_records (worker_id, hostname, status, last_heartbeat, started_at)
           VALUES ($1, $2, 'active', now(), now())
           ON CONFLICT (worker_id) DO UPDATE SET
             status = 'active', last_heartbeat = now(), started_at = now()"#,
    )
    .bind(worker_id)
    .bind(hostname)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn heartbeat(
    pool: &PgPool,
    worker_id: &str,
    current_memory_usage: Option<i64>,
    jobs_processed_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE worker_records SET
             last_heartbeat = now(), current_memory_usage = $2, jobs_processed_count = $3
           WHERE worker_id = $1"#,
    )
    .bind(worker_id)
    .bind(current_memory_usage)
    .bind(jobs_processed_count)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, worker_id: &str, status: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE worker_records SET status = $2 WHERE worker_id = $1")
        .bind(worker_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_current_job(
    pool: &PgPool,
    worker_id: &str,
    current_job_id: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE worker_records SET current_job_id = $2 WHERE worker_id = $1")
        .bind(worker_id)
        .bind(current_job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Called by the Scheduler's reap task: workers silent past the heartbeat
/// timeout are marked inactive so their in_progress jobs become reclaimable.
pub async fn reap_inactive(
    pool: &PgPool,
    heartbeat_timeout_secs: i64,
) -> Result<Vec<WorkerRecord>, sqlx::Error> {
    sqlx::query_as::<_, WorkerRecord>(
        r#"UPDATE worker_records SET status = 'inactive'
           WHERE status = 'active' AND last_heartbeat < now() - ($1 || ' seconds')::interval
           RETURNING *"#,
    )
    .bind(heartbeat_timeout_secs.to_string())
    .fetch_all(pool)
    .await
}
