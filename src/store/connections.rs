use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Connection;

/// INSERT ... ON CONFLICT (user_id, email) DO UPDATE, mirroring the upsert
/// shape in `routes/github/oauth.rs::callback`. Tokens arrive already encrypted.
#[allow(clippy::too_many_arguments)]
pub async fn upsert(
    pool: &PgPool,
    user_id: &str,
    provider: &str,
    email: &str,
    access_token_enc: &str,
    refresh_token_enc: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<Connection, sqlx::Error> {
    sqlx::query_as::<_, Connection>(
        r#"INSERT INTO connections
             (user_id, provider, email, access_token, refresh_token, token_expires_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (user_id, email) DO UPDATE SET
             access_token = $4,
             refresh_token = $5,
             token_expires_at = $6,
             sync_status = 'idle',
             sync_error = NULL,
             updated_at = now()
           RETURNING *"#,
    )
    .bind(user_id)
    .bind(provider)
    .bind(email)
    .bind(access_token_enc)
    .bind(refresh_token_enc)
    .bind(token_expires_at)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    user_id: &str,
    id: Uuid,
) -> Result<Option<Connection>, sqlx::Error> {
    sqlx::query_as::<_, Connection>("SELECT * FROM connections WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Used by the webhook path, which has no authenticated user_id in hand —
/// looked up by the provider-assigned watch resource id instead.
pub async fn find_by_watch_resource_id(
    pool: &PgPool,
    resource_id: &str,
) -> Result<Option<Connection>, sqlx::Error> {
    sqlx::query_as::<_, Connection>("SELECT * FROM connections WHERE watch_resource_id = $1")
        .bind(resource_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_due_for_incremental_sync(pool: &PgPool) -> Result<Vec<Connection>, sqlx::Error> {
    sqlx::query_as::<_, Connection>(
        r#"SELECT c.* FROM connections c
           WHERE c.sync_enabled
             AND (c.last_synced_at IS NULL
                  OR c.last_synced_at < now() - (c.sync_frequency_minutes || ' minutes')::interval)
             AND NOT EXISTS (
                 SELECT 1 FROM sync_jobs j
                 WHERE j.connection_id = c.id AND j.status = 'in_progress'
             )"#,
    )
    .fetch_all(pool)
    .await
}

pub async fn find_watches_expiring_within(
    pool: &PgPool,
    provider: &str,
    horizon: chrono::Duration,
) -> Result<Vec<Connection>, sqlx::Error> {
    let horizon_secs = horizon.num_seconds().to_string();
    sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE provider = $1 AND watch_expiration < now() + ($2 || ' seconds')::interval",
    )
    .bind(provider)
    .bind(horizon_secs)
    .fetch_all(pool)
    .await
}

/// Conditional latch: only succeeds if the connection isn't already mid-sync.
/// Returns the number of rows affected so callers can detect the race.
pub async fn try_acquire_sync_latch(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE connections SET sync_in_progress = true WHERE id = $1 AND sync_in_progress = false",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// MUST be called on every exit path once the latch is held.
pub async fn release_sync_latch(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE connections SET sync_in_progress = false WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_tokens(
    pool: &PgPool,
    id: Uuid,
    access_token_enc: &str,
    refresh_token_enc: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET
             access_token = $2, refresh_token = $3, token_expires_at = $4, updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(access_token_enc)
    .bind(refresh_token_enc)
    .bind(token_expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_requires_reauth(pool: &PgPool, id: Uuid, reason: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET
             sync_status = 'requires_reauth', sync_error = $2, last_sync_error_at = now(), updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_sync_error(pool: &PgPool, id: Uuid, reason: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET
             sync_status = 'error', sync_error = $2, last_sync_error_at = now(), updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

/// Used when a sync job is cancelled mid-run: the connection wasn't
/// touched by an error, so it goes back to idle rather than `error`.
pub async fn mark_idle(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE connections SET sync_status = 'idle', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_syncing(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE connections SET sync_status = 'syncing', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn finish_sync_success(
    pool: &PgPool,
    id: Uuid,
    latest_history_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET
             latest_history_id = $2, last_synced_at = now(), sync_status = 'idle', sync_error = NULL,
             updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(latest_history_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_watch(
    pool: &PgPool,
    id: Uuid,
    resource_id: &str,
    history_id: &str,
    expiration: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET
             watch_resource_id = $2, watch_history_id = $3, watch_expiration = $4, updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(resource_id)
    .bind(history_id)
    .bind(expiration)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_watch_history_id(pool: &PgPool, id: Uuid, history_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE connections SET watch_history_id = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(history_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_settings(
    pool: &PgPool,
    user_id: &str,
    id: Uuid,
    sync_enabled: Option<bool>,
    sync_frequency_minutes: Option<i32>,
    sync_batch_size: Option<i32>,
) -> Result<Option<Connection>, sqlx::Error> {
    sqlx::query_as::<_, Connection>(
        r#"UPDATE connections SET
             sync_enabled = COALESCE($3, sync_enabled),
             sync_frequency_minutes = COALESCE($4, sync_frequency_minutes),
             sync_batch_size = COALESCE($5, sync_batch_size),
             updated_at = now()
           WHERE id = $1 AND user_id = $2
           RETURNING *"#,
    )
    .bind(id)
    .bind(user_id)
    .bind(sync_enabled)
    .bind(sync_frequency_minutes)
    .bind(sync_batch_size)
    .fetch_optional(pool)
    .await
}

pub async fn list_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Connection>, sqlx::Error> {
    sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn delete(pool: &PgPool, user_id: &str, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM connections WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
