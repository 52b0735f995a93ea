use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SyncError;
use crate::job_queue::JobQueue;
use crate::models::Connection;
use crate::provider::ProviderClient;
use crate::store::{folders, messages};
use crate::sync_engine::backoff::with_rate_limit_retry;
use crate::token_manager::TokenManager;

const FETCH_BATCH_SIZE: usize = 20;
const DELETE_BATCH_SIZE: usize = 100;
const INTER_BATCH_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub enum IncrementalSyncOutcome {
    RequiresFullSync,
    Applied {
        new_history_id: String,
        added: usize,
        deleted: usize,
        updated: usize,
    },
}

/// Applies the delta since `start_history_id`. Adds,
/// deletes, and updates are partitioned with precedence add > delete > update
/// so a message touched by more than one history entry is counted exactly once.
///
/// `cancellation` is `Some((queue, job_id))` only when this run is driven by a
/// worker-claimed job; push-notification and synchronous HTTP callers have no
/// job to cancel and pass `None`, which makes every checkpoint below a no-op.
pub async fn run(
    pool: &PgPool,
    client: &dyn ProviderClient,
    token_manager: &TokenManager<'_>,
    connection: &Connection,
    start_history_id: &str,
    cancellation: Option<(&JobQueue, Uuid)>,
) -> Result<IncrementalSyncOutcome, SyncError> {
    let access_token = token_manager.ensure_fresh(connection, client).await?;

    let mut to_add: Vec<String> = Vec::new();
    let mut to_delete: Vec<String> = Vec::new();
    let mut to_update: Vec<String> = Vec::new();
    let mut last_history_id = start_history_id.to_string();
    let mut page_token: Option<String> = None;

    loop {
        if is_cancelled(cancellation).await? {
            return Err(SyncError::JobCancelled);
        }

        let delta = match with_rate_limit_retry(|| {
            client.list_history(&access_token, start_history_id, page_token.as_deref())
        })
        .await
        {
            Ok(delta) => delta,
            Err(SyncError::InvalidHistoryCursor) => return Ok(IncrementalSyncOutcome::RequiresFullSync),
            Err(other) => return Err(other),
        };

        to_add.extend(delta.added);
        to_delete.extend(delta.deleted);
        to_update.extend(delta.updated);
        if let Some(id) = delta.history_id {
            last_history_id = id;
        }
        page_token = delta.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    let added_set: HashSet<String> = to_add.iter().cloned().collect();
    let to_delete: Vec<String> = to_delete.into_iter().filter(|id| !added_set.contains(id)).collect();
    let deleted_set: HashSet<String> = to_delete.iter().cloned().collect();
    let to_update: Vec<String> = to_update
        .into_iter()
        .filter(|id| !added_set.contains(id) && !deleted_set.contains(id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let folder_rows = folders::list_for_connection(pool, connection.id).await?;

    let mut added = 0usize;
    for chunk in to_add.chunks(FETCH_BATCH_SIZE) {
        for message_id in chunk {
            match with_rate_limit_retry(|| client.get_message(&access_token, message_id)).await {
                Ok(parsed) => {
                    let folder = resolve_folder(&folder_rows, &parsed.label_ids);
                    if let Some(folder) = folder {
                        messages::upsert(pool, &connection.user_id, connection.id, folder.id, &parsed).await?;
                        added += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(message_id, error = %e, "failed to fetch message during incremental sync");
                }
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(INTER_BATCH_DELAY_MS)).await;
    }

    if is_cancelled(cancellation).await? {
        return Err(SyncError::JobCancelled);
    }

    let mut deleted = 0usize;
    for chunk in to_delete.chunks(DELETE_BATCH_SIZE) {
        deleted += messages::delete_by_provider_ids(pool, connection.id, chunk).await? as usize;
    }

    if is_cancelled(cancellation).await? {
        return Err(SyncError::JobCancelled);
    }

    let mut updated = 0usize;
    for chunk in to_update.chunks(FETCH_BATCH_SIZE) {
        for message_id in chunk {
            match with_rate_limit_retry(|| client.get_message(&access_token, message_id)).await {
                Ok(parsed) => {
                    let folder = resolve_folder(&folder_rows, &parsed.label_ids);
                    if let Some(folder) = folder {
                        messages::upsert(pool, &connection.user_id, connection.id, folder.id, &parsed).await?;
                        updated += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(message_id, error = %e, "failed to fetch message during incremental update");
                }
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(INTER_BATCH_DELAY_MS)).await;
    }

    Ok(IncrementalSyncOutcome::Applied {
        new_history_id: last_history_id,
        added,
        deleted,
        updated,
    })
}

async fn is_cancelled(cancellation: Option<(&JobQueue, Uuid)>) -> Result<bool, SyncError> {
    match cancellation {
        Some((queue, job_id)) => queue.is_cancelled(job_id).await,
        None => Ok(false),
    }
}

fn resolve_folder<'a>(
    folder_rows: &'a [crate::models::Folder],
    label_ids: &[String],
) -> Option<&'a crate::models::Folder> {
    for label in label_ids {
        if let Some(folder) = folder_rows.iter().find(|f| &f.provider_folder_id == label) {
            return Some(folder);
        }
    }
    folder_rows.iter().find(|f| f.folder_type == "archive").or_else(|| {
        folder_rows.iter().find(|f| f.folder_type == "inbox")
    })
}
