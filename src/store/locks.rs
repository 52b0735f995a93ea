use chrono::Duration;
use sqlx::PgPool;

/// Acquire by insert; a unique-violation means another replica holds it
/// already, which this treats as "skip silently" — mirrors the
/// claim-then-act idiom the job runner uses for sync jobs, but here the
/// conflict itself (not rows_affected) is the signal.
pub async fn try_acquire(pool: &PgPool, id: &str, ttl: Duration) -> Result<bool, sqlx::Error> {
    let ttl_secs = ttl.num_seconds().to_string();
    let result = sqlx::query(
        r#"INSERT INTO sync_locks (id, acquired_at, expires_at)
           VALUES ($1, now(), now() + ($2 || ' seconds')::interval)
           ON CONFLICT (id) DO UPDATE SET
             acquired_at = now(), expires_at = now() + ($2 || ' seconds')::interval
           WHERE sync_locks.expires_at < now()"#,
    )
    .bind(id)
    .bind(ttl_secs)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sync_locks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
