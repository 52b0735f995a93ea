use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A linked mailbox for one tenant. `access_token`/`refresh_token` are stored
/// AES-256-GCM-encrypted (see `crate::crypto::TokenCipher`) — callers decrypt
/// them on the way out, never hold the decrypted value longer than one call.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: String,
    pub provider: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub latest_history_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_frequency_minutes: i32,
    pub sync_batch_size: i32,
    pub sync_enabled: bool,
    pub sync_status: String,
    pub sync_error: Option<String>,
    pub last_sync_error_at: Option<DateTime<Utc>>,
    pub sync_in_progress: bool,
    pub watch_resource_id: Option<String>,
    pub watch_history_id: Option<String>,
    pub watch_expiration: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConnection {
    pub provider: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConnectionSettings {
    pub sync_enabled: Option<bool>,
    pub sync_frequency_minutes: Option<i32>,
    pub sync_batch_size: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Folder {
    pub id: Uuid,
    pub user_id: String,
    pub connection_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub folder_type: String,
    pub provider_folder_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedMessage {
    pub id: Uuid,
    pub user_id: String,
    pub connection_id: Uuid,
    pub folder_id: Uuid,
    pub provider_email_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub body_html: Option<String>,
    pub body_preview: Option<String>,
    pub read: bool,
    pub starred: bool,
    pub attachments: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
