use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Folder;

pub const DEFAULT_FOLDERS: &[(&str, &str, &str)] = &[
    ("Inbox", "inbox", "INBOX"),
    ("Sent", "sent", "SENT"),
    ("Drafts", "drafts", "DRAFT"),
    ("Trash", "trash", "TRASH"),
];

pub async fn list_for_connection(
    pool: &PgPool,
    connection_id: Uuid,
) -> Result<Vec<Folder>, sqlx::Error> {
    sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders WHERE connection_id = $1 ORDER BY created_at ASC",
    )
    .bind(connection_id)
    .fetch_all(pool)
    .await
}

pub async fn find_by_type(
    pool: &PgPool,
    connection_id: Uuid,
    folder_type: &str,
) -> Result<Option<Folder>, sqlx::Error> {
    sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders WHERE connection_id = $1 AND type = $2 LIMIT 1",
    )
    .bind(connection_id)
    .bind(folder_type)
    .fetch_optional(pool)
    .await
}

/// Seeds the four default folders if none exist yet — one statement per
/// row, `ON CONFLICT` making the call idempotent.
pub async fn seed_defaults_if_absent(
    pool: &PgPool,
    user_id: &str,
    connection_id: Uuid,
) -> Result<(), sqlx::Error> {
    let existing = list_for_connection(pool, connection_id).await?;
    if !existing.is_empty() {
        return Ok(());
    }
    for (name, folder_type, provider_folder_id) in DEFAULT_FOLDERS {
        sqlx::query(
            r#"INSERT INTO folders (user_id, connection_id, name, type, provider_folder_id)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (connection_id, provider_folder_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(name)
        .bind(folder_type)
        .bind(provider_folder_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn upsert_discovered(
    pool: &PgPool,
    user_id: &str,
    connection_id: Uuid,
    name: &str,
    folder_type: &str,
    provider_folder_id: &str,
) -> Result<Folder, sqlx::Error> {
    sqlx::query_as::<_, Folder>(
        r#"INSERT INTO folders (user_id, connection_id, name, type, provider_folder_id)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (connection_id, provider_folder_id) DO UPDATE SET name = $3
           RETURNING *"#,
    )
    .bind(user_id)
    .bind(connection_id)
    .bind(name)
    .bind(folder_type)
    .bind(provider_folder_id)
    .fetch_one(pool)
    .await
}
