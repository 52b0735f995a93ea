use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PartialFolderFailure, SyncError};
use crate::job_queue::JobQueue;
use crate::models::Connection;
use crate::provider::ProviderClient;
use crate::store::{connections, folders, messages};
use crate::sync_engine::backoff::with_rate_limit_retry;
use crate::token_manager::TokenManager;

const PAGE_DELAY_MS: u64 = 500;
const SUB_BATCH_DELAY_MS: u64 = 100;
const SUB_BATCH_SIZE: usize = 50;

#[derive(Debug)]
pub struct FullSyncResult {
    pub latest_history_id: String,
    pub messages_synced: i32,
    pub folders_completed: i32,
}

/// Rebuilds the cache for every folder of a connection:
/// `prepare -> refresh_token -> discover_folders -> [per folder: clear -> page_loop] -> finalize`.
pub async fn run(
    pool: &PgPool,
    client: &dyn ProviderClient,
    token_manager: &TokenManager<'_>,
    queue: &JobQueue,
    job_id: Uuid,
    connection: &Connection,
) -> Result<FullSyncResult, SyncError> {
    connections::mark_syncing(pool, connection.id).await?;

    let access_token = token_manager.ensure_fresh(connection, client).await?;

    let labels = with_rate_limit_retry(|| client.list_labels(&access_token)).await?;
    let latest_history_id = labels
        .iter()
        .find(|l| l.id == "INBOX")
        .or_else(|| labels.iter().find(|l| l.history_id.is_some()))
        .and_then(|l| l.history_id.clone())
        .ok_or_else(|| SyncError::Provider("no label carried a historyId".to_string()))?;

    folders::seed_defaults_if_absent(pool, &connection.user_id, connection.id).await?;
    let folder_rows = folders::list_for_connection(pool, connection.id).await?;

    let total_folders = folder_rows.len() as i32;
    queue.report_progress_fields(job_id, 0, 0, total_folders, 0, None, None).await?;

    let mut messages_synced = 0i32;
    let mut folders_completed = 0i32;

    for folder in &folder_rows {
        if queue.is_cancelled(job_id).await? {
            return Err(SyncError::JobCancelled);
        }

        queue
            .report_progress_fields(
                job_id,
                progress(folders_completed, total_folders),
                folders_completed,
                total_folders,
                messages_synced,
                Some(folder.name.clone()),
                None,
            )
            .await?;

        match sync_one_folder(
            pool,
            client,
            &access_token,
            connection,
            folder,
            queue,
            job_id,
            folders_completed,
            total_folders,
            &mut messages_synced,
        )
        .await
        {
            Ok(()) => {}
            Err(SyncError::JobCancelled) => return Err(SyncError::JobCancelled),
            Err(e) => {
                let failure = PartialFolderFailure { folder_name: folder.name.clone(), reason: e.to_string() };
                tracing::warn!(%failure, "folder failed during full sync, continuing with remaining folders");
                queue
                    .report_progress_fields(
                        job_id,
                        progress(folders_completed, total_folders),
                        folders_completed,
                        total_folders,
                        messages_synced,
                        Some(folder.name.clone()),
                        Some(failure.to_string()),
                    )
                    .await?;
            }
        }

        folders_completed += 1;
    }

    connections::finish_sync_success(pool, connection.id, &latest_history_id).await?;

    Ok(FullSyncResult {
        latest_history_id,
        messages_synced,
        folders_completed,
    })
}

fn progress(folders_completed: i32, total_folders: i32) -> i32 {
    if total_folders == 0 {
        100
    } else {
        ((100 * folders_completed) as f64 / total_folders as f64).round() as i32
    }
}

#[allow(clippy::too_many_arguments)]
async fn sync_one_folder(
    pool: &PgPool,
    client: &dyn ProviderClient,
    access_token: &str,
    connection: &Connection,
    folder: &crate::models::Folder,
    queue: &JobQueue,
    job_id: Uuid,
    folders_completed: i32,
    total_folders: i32,
    messages_synced: &mut i32,
) -> Result<(), SyncError> {
    messages::delete_for_folder(pool, folder.id).await?;

    let page_size = connection.sync_batch_size.clamp(1, 500) as u32;
    let mut page_token: Option<String> = None;

    loop {
        if queue.is_cancelled(job_id).await? {
            return Err(SyncError::JobCancelled);
        }

        let access_token_owned = access_token.to_string();
        let page = with_rate_limit_retry(|| {
            client.list_messages(&access_token_owned, &folder.provider_folder_id, page_size, page_token.as_deref())
        })
        .await?;

        for chunk in page.messages.chunks(SUB_BATCH_SIZE) {
            for summary in chunk {
                let access_token_owned = access_token.to_string();
                match with_rate_limit_retry(|| client.get_message(&access_token_owned, &summary.provider_email_id))
                    .await
                {
                    Ok(parsed) => {
                        messages::upsert(pool, &connection.user_id, connection.id, folder.id, &parsed).await?;
                        *messages_synced += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            message_id = %summary.provider_email_id,
                            error = %e,
                            "failed to fetch message during full sync"
                        );
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(SUB_BATCH_DELAY_MS)).await;
        }

        queue
            .report_progress_fields(
                job_id,
                progress(folders_completed, total_folders),
                folders_completed,
                total_folders,
                *messages_synced,
                Some(folder.name.clone()),
                None,
            )
            .await?;

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(PAGE_DELAY_MS)).await;
    }

    Ok(())
}
