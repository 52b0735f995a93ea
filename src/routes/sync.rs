use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::middleware::AuthUser;
use crate::models::{ApiResponse, SyncJob};
use crate::provider::{self, Provider};
use crate::state::AppState;
use crate::store::{connections, folders, messages};
use crate::sync_engine::IncrementalSyncOutcome;
use crate::token_manager::TokenManager;

#[derive(Debug, Deserialize)]
pub struct FullSyncBody {
    #[serde(rename = "connectionId")]
    pub connection_id: Uuid,
    pub priority: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct EnqueuedSync {
    #[serde(rename = "syncId")]
    pub sync_id: Uuid,
    #[serde(rename = "alreadyRunning")]
    pub already_running: bool,
}

/// POST /sync/full
pub async fn enqueue_full(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<FullSyncBody>,
) -> Result<Json<ApiResponse<EnqueuedSync>>, SyncError> {
    let connection = connections::find_by_id(&state.pool, &auth.user_id, body.connection_id)
        .await?
        .ok_or(SyncError::ConnectionNotFound)?;

    match state
        .queue
        .enqueue(&auth.user_id, connection.id, &connection.provider, "full", body.priority.unwrap_or(1))
        .await
    {
        Ok(job) => Ok(Json(ApiResponse::new(EnqueuedSync { sync_id: job.id, already_running: false }))),
        Err(SyncError::ConflictingJobInProgress { existing_job_id }) => {
            Ok(Json(ApiResponse::new(EnqueuedSync { sync_id: existing_job_id, already_running: true })))
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct IncrementalSyncBody {
    #[serde(rename = "connectionId")]
    pub connection_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IncrementalSyncResponse {
    pub success: bool,
    #[serde(rename = "requiresFullSync")]
    pub requires_full_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
}

/// POST /sync/incremental — runs synchronously rather than queuing a job.
pub async fn run_incremental(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<IncrementalSyncBody>,
) -> Result<Json<ApiResponse<IncrementalSyncResponse>>, SyncError> {
    let connection = connections::find_by_id(&state.pool, &auth.user_id, body.connection_id)
        .await?
        .ok_or(SyncError::ConnectionNotFound)?;

    let Some(start_cursor) = connection.latest_history_id.clone() else {
        return Ok(Json(ApiResponse::new(IncrementalSyncResponse {
            success: false,
            requires_full_sync: true,
            added: None,
            deleted: None,
            updated: None,
        })));
    };

    let provider = Provider::parse(&connection.provider)?;
    let client = provider::client_for(
        provider,
        state.http.clone(),
        state.config.gmail_api_base.clone(),
        state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&state.pool, &state.cipher, &state.config);

    let outcome = crate::sync_engine::incremental_sync::run(
        &state.pool,
        client.as_ref(),
        &token_manager,
        &connection,
        &start_cursor,
        None,
    )
    .await?;

    match outcome {
        IncrementalSyncOutcome::RequiresFullSync => Ok(Json(ApiResponse::new(IncrementalSyncResponse {
            success: false,
            requires_full_sync: true,
            added: None,
            deleted: None,
            updated: None,
        }))),
        IncrementalSyncOutcome::Applied { new_history_id, added, deleted, updated } => {
            connections::finish_sync_success(&state.pool, connection.id, &new_history_id).await?;
            Ok(Json(ApiResponse::new(IncrementalSyncResponse {
                success: true,
                requires_full_sync: false,
                added: Some(added),
                deleted: Some(deleted),
                updated: Some(updated),
            })))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OnDemandSyncBody {
    #[serde(rename = "connectionId")]
    pub connection_id: Uuid,
    #[serde(rename = "folderType")]
    pub folder_type: String,
    #[serde(rename = "fullSync", default)]
    pub full_sync: bool,
}

#[derive(Debug, Serialize)]
pub struct OnDemandSyncResponse {
    #[serde(rename = "messagesSynced")]
    pub messages_synced: usize,
}

/// POST /sync/on-demand — single-folder refresh; pre-clear when fullSync=true.
/// The folder is looked up by its UUID row, never by matching the type string
/// directly against a UUID column.
pub async fn on_demand(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<OnDemandSyncBody>,
) -> Result<Json<ApiResponse<OnDemandSyncResponse>>, SyncError> {
    let connection = connections::find_by_id(&state.pool, &auth.user_id, body.connection_id)
        .await?
        .ok_or(SyncError::ConnectionNotFound)?;

    let folder = folders::find_by_type(&state.pool, connection.id, &body.folder_type)
        .await?
        .ok_or(SyncError::FolderNotFound)?;

    if body.full_sync {
        messages::delete_for_folder(&state.pool, folder.id).await?;
    }

    let provider = Provider::parse(&connection.provider)?;
    let client = provider::client_for(
        provider,
        state.http.clone(),
        state.config.gmail_api_base.clone(),
        state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&state.pool, &state.cipher, &state.config);
    let access_token = token_manager.ensure_fresh(&connection, client.as_ref()).await?;

    let page_size = connection.sync_batch_size.clamp(1, 500) as u32;
    let page = client.list_messages(&access_token, &folder.provider_folder_id, page_size, None).await?;

    let mut synced = 0usize;
    for summary in &page.messages {
        let parsed = client.get_message(&access_token, &summary.provider_email_id).await?;
        messages::upsert(&state.pool, &auth.user_id, connection.id, folder.id, &parsed).await?;
        synced += 1;
    }

    Ok(Json(ApiResponse::new(OnDemandSyncResponse { messages_synced: synced })))
}

/// GET /sync/status/:id
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SyncJob>>, SyncError> {
    let job = state.queue.find_by_id(&auth.user_id, id).await?.ok_or(SyncError::ConnectionNotFound)?;
    Ok(Json(ApiResponse::new(job)))
}

/// POST /sync/cancel/:id
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<bool>>, SyncError> {
    let cancelled = state.queue.cancel(&auth.user_id, id).await?;
    Ok(Json(ApiResponse::new(cancelled)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

/// GET /sync/history?limit=N
pub async fn history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ApiResponse<Vec<SyncJob>>>, SyncError> {
    let jobs = state.queue.history(&auth.user_id, params.limit.unwrap_or(50)).await?;
    Ok(Json(ApiResponse::new(jobs)))
}
