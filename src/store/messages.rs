use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::provider::ParsedMessage;

/// Single write contract for CachedMessage, used by FullSync, IncrementalSync,
/// and the push-notification path alike.
pub async fn upsert(
    pool: &PgPool,
    user_id: &str,
    connection_id: Uuid,
    folder_id: Uuid,
    msg: &ParsedMessage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO cached_messages
             (user_id, connection_id, folder_id, provider_email_id, subject, sender,
              recipients, cc, date, body_html, body_preview, read, starred, attachments)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
           ON CONFLICT (user_id, connection_id, provider_email_id) DO UPDATE SET
             folder_id = $3,
             subject = $5,
             sender = $6,
             recipients = $7,
             cc = $8,
             date = $9,
             body_html = $10,
             body_preview = $11,
             read = $12,
             starred = $13,
             attachments = $14,
             updated_at = now()"#,
    )
    .bind(user_id)
    .bind(connection_id)
    .bind(folder_id)
    .bind(&msg.provider_email_id)
    .bind(&msg.subject)
    .bind(&msg.sender)
    .bind(&msg.recipients)
    .bind(&msg.cc)
    .bind(msg.date as Option<DateTime<Utc>>)
    .bind(&msg.body_html)
    .bind(&msg.body_preview)
    .bind(msg.read)
    .bind(msg.starred)
    .bind(&msg.attachments)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_for_folder(pool: &PgPool, folder_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cached_messages WHERE folder_id = $1")
        .bind(folder_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Deletes by provider-assigned message id, batched by the caller into
/// groups of 100 by the caller.
pub async fn delete_by_provider_ids(
    pool: &PgPool,
    connection_id: Uuid,
    provider_email_ids: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM cached_messages WHERE connection_id = $1 AND provider_email_id = ANY($2)",
    )
    .bind(connection_id)
    .bind(provider_email_ids)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
