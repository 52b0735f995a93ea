use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::job_queue::JobQueue;
use crate::middleware::AuthUser;
use crate::models::ApiResponse;
use crate::provider::{self, Provider};
use crate::state::AppState;
use crate::store::connections;
use crate::watch_manager::WatchManager;

#[derive(Debug, Deserialize)]
pub struct CreateConnectionBody {
    pub provider: String,
    pub email: String,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCreated {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "syncId")]
    pub sync_id: Uuid,
}

/// POST /email-connections
///
/// Validates the token against the provider, upserts the Connection,
/// enqueues a priority-1 full sync, and installs a push watch for Gmail.
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateConnectionBody>,
) -> Result<Json<ApiResponse<ConnectionCreated>>, SyncError> {
    let provider = Provider::parse(&body.provider)?;
    let client = provider::client_for(
        provider,
        state.http.clone(),
        state.config.gmail_api_base.clone(),
        state.config.gmail_token_endpoint.clone(),
    );

    // "who am I" validation — listing labels requires a working access token.
    client
        .list_labels(&body.access_token)
        .await
        .map_err(|_| SyncError::ProviderTokenRevoked("initial access token rejected by provider".to_string()))?;

    let access_token_enc = state.cipher.encrypt(&body.access_token);
    let refresh_token_enc = state.cipher.encrypt(&body.refresh_token);

    let connection = connections::upsert(
        &state.pool,
        &auth.user_id,
        provider.as_str(),
        &body.email,
        &access_token_enc,
        &refresh_token_enc,
        body.expires_at,
    )
    .await?;

    let queue = JobQueue::new(state.pool.clone());
    let job = match queue.enqueue(&auth.user_id, connection.id, provider.as_str(), "full", 1).await {
        Ok(job) => job,
        Err(SyncError::ConflictingJobInProgress { existing_job_id }) => {
            return Ok(Json(ApiResponse::new(ConnectionCreated {
                id: connection.id,
                email: connection.email,
                sync_id: existing_job_id,
            })));
        }
        Err(e) => return Err(e),
    };

    if provider == Provider::Gmail {
        let watch_manager = WatchManager::new(&state.pool, &state.http, &state.cipher, &state.config);
        if let Err(e) = watch_manager.install(&connection).await {
            tracing::warn!(connection_id = %connection.id, error = %e, "failed to install push watch on connect");
        }
    }

    Ok(Json(ApiResponse::new(ConnectionCreated {
        id: connection.id,
        email: connection.email,
        sync_id: job.id,
    })))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<crate::models::Connection>>>, SyncError> {
    let rows = connections::list_for_user(&state.pool, &auth.user_id).await?;
    Ok(Json(ApiResponse::new(rows)))
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub id: Uuid,
    pub email: String,
    pub provider: String,
    pub status: String,
    #[serde(rename = "needsReconnect")]
    pub needs_reconnect: bool,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

/// GET /email-connections/:id/status
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ConnectionStatus>>, SyncError> {
    let connection = connections::find_by_id(&state.pool, &auth.user_id, id)
        .await?
        .ok_or(SyncError::ConnectionNotFound)?;

    Ok(Json(ApiResponse::new(ConnectionStatus {
        id: connection.id,
        email: connection.email,
        provider: connection.provider,
        status: connection.sync_status.clone(),
        needs_reconnect: connection.sync_status == "requires_reauth",
        last_synced_at: connection.last_synced_at,
        error: connection.sync_error,
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<bool>>, SyncError> {
    let affected = connections::delete(&state.pool, &auth.user_id, id).await?;
    if affected == 0 {
        return Err(SyncError::ConnectionNotFound);
    }
    Ok(Json(ApiResponse::new(true)))
}
