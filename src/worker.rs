use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::error::SyncError;
use crate::job_queue::JobQueue;
use crate::models::SyncJob;
use crate::provider::{self, Provider};
use crate::store::{connections, workers};
use crate::sync_engine::{full_sync, incremental_sync, IncrementalSyncOutcome};
use crate::token_manager::TokenManager;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const CONSECUTIVE_FAILURES_BEFORE_PAUSE: u32 = 3;

/// Drives jobs to completion within one process. `starting -> active ->
/// processing -> active -> ... -> draining -> stopped`, with an `error`
/// pause-and-resume loop on repeated failures.
pub struct Worker {
    pub worker_id: String,
    pool: PgPool,
    http: reqwest::Client,
    cipher: TokenCipher,
    config: Config,
    queue: JobQueue,
    jobs_processed: AtomicU32,
    consecutive_failures: AtomicU32,
    shutdown: Arc<tokio::sync::Notify>,
}

impl Worker {
    pub fn new(pool: PgPool, cipher: TokenCipher, config: Config) -> Self {
        let worker_id = format!("{}-{}", config.worker_id_prefix, uuid::Uuid::new_v4());
        let queue = JobQueue::new(pool.clone());
        Self {
            worker_id,
            pool,
            http: reqwest::Client::new(),
            cipher,
            config,
            queue,
            jobs_processed: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub async fn register(&self) -> Result<(), SyncError> {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        workers::register(&self.pool, &self.worker_id, &hostname).await?;
        Ok(())
    }

    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                        let processed = worker.jobs_processed.load(Ordering::Relaxed) as i32;
                        if let Err(e) = workers::heartbeat(&worker.pool, &worker.worker_id, None, processed).await {
                            tracing::error!(worker_id = %worker.worker_id, error = %e, "heartbeat failed");
                        }
                    }
                    _ = worker.shutdown.notified() => break,
                }
            }
        })
    }

    /// Runs the poll loop until `shutdown()` is called. Intended to be driven
    /// by its own `tokio::spawn`ed task alongside the heartbeat task.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(worker_id = %self.worker_id, "worker poll loop started");
        loop {
            tokio::select! {
                _ = self.poll_once() => {}
                _ = self.shutdown.notified() => break,
            }
        }
        if let Err(e) = self.queue.release_all(&self.worker_id).await {
            tracing::error!(worker_id = %self.worker_id, error = %e, "release_all failed during shutdown");
        }
        if let Err(e) = workers::set_status(&self.pool, &self.worker_id, "stopped").await {
            tracing::error!(worker_id = %self.worker_id, error = %e, "failed to mark worker stopped");
        }
        tracing::info!(worker_id = %self.worker_id, "worker stopped");
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    async fn poll_once(&self) {
        if let Err(e) = self
            .queue
            .reclaim_abandoned(&self.worker_id, self.config.lock_timeout_as_chrono(), 1)
            .await
        {
            tracing::error!(worker_id = %self.worker_id, error = %e, "reclaim_abandoned failed");
        }

        match self.queue.claim_next(&self.worker_id, self.config.max_concurrent_jobs as i64).await {
            Ok(jobs) if !jobs.is_empty() => {
                for job in jobs {
                    self.execute(job).await;
                }
            }
            Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                tracing::error!(worker_id = %self.worker_id, error = %e, "claim_next failed");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    async fn execute(&self, job: SyncJob) {
        workers::set_current_job(&self.pool, &self.worker_id, Some(job.id)).await.ok();
        workers::set_status(&self.pool, &self.worker_id, "processing").await.ok();

        match connections::try_acquire_sync_latch(&self.pool, job.connection_id).await {
            Ok(rows) if rows > 0 => {
                let result = self.execute_one(&job).await;

                match result {
                    Ok(()) => {
                        self.consecutive_failures.store(0, Ordering::Relaxed);
                        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(SyncError::JobCancelled) => {
                        tracing::info!(job_id = %job.id, "job cancelled mid-sync, leaving it as the caller left it");
                        connections::mark_idle(&self.pool, job.connection_id).await.ok();
                    }
                    Err(SyncError::ProviderTokenRevoked(reason)) => {
                        self.queue.fail(job.id, &format!("token revoked: {reason}")).await.ok();
                        self.note_failure().await;
                    }
                    Err(e) => {
                        self.queue.fail(job.id, &e.to_string()).await.ok();
                        connections::mark_sync_error(&self.pool, job.connection_id, &e.to_string()).await.ok();
                        self.note_failure().await;
                    }
                }

                connections::release_sync_latch(&self.pool, job.connection_id).await.ok();
            }
            Ok(_) => {
                tracing::warn!(
                    job_id = %job.id,
                    connection_id = %job.connection_id,
                    "connection already mid-sync elsewhere, releasing job for retry"
                );
                self.queue.release(job.id).await.ok();
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to acquire sync latch");
                self.queue.release(job.id).await.ok();
            }
        }

        workers::set_current_job(&self.pool, &self.worker_id, None).await.ok();
        workers::set_status(&self.pool, &self.worker_id, "active").await.ok();
    }

    async fn note_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= CONSECUTIVE_FAILURES_BEFORE_PAUSE {
            tracing::warn!(worker_id = %self.worker_id, failures, "pausing worker after consecutive failures");
            workers::set_status(&self.pool, &self.worker_id, "error").await.ok();
            tokio::time::sleep(self.config.worker_retry_delay).await;
            workers::set_status(&self.pool, &self.worker_id, "active").await.ok();
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
    }

    async fn execute_one(&self, job: &SyncJob) -> Result<(), SyncError> {
        let connection = connections::find_by_id(&self.pool, &job.user_id, job.connection_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound)?;

        let provider = Provider::parse(&job.provider)?;
        let client = provider::client_for(
        provider,
        self.http.clone(),
        self.config.gmail_api_base.clone(),
        self.config.gmail_token_endpoint.clone(),
    );
        let token_manager = TokenManager::new(&self.pool, &self.cipher, &self.config);

        match job.sync_type.as_str() {
            "full" => {
                let result = full_sync::run(&self.pool, client.as_ref(), &token_manager, &self.queue, job.id, &connection).await?;
                self.queue.complete(job.id, Some(&result.latest_history_id)).await?;
                Ok(())
            }
            "incremental" => {
                let start_cursor = connection.latest_history_id.clone().ok_or(SyncError::InvalidHistoryCursor)?;
                let outcome = incremental_sync::run(
                    &self.pool,
                    client.as_ref(),
                    &token_manager,
                    &connection,
                    &start_cursor,
                    Some((&self.queue, job.id)),
                )
                .await?;
                match outcome {
                    IncrementalSyncOutcome::RequiresFullSync => {
                        self.queue.fail(job.id, "history cursor expired, requires full sync").await?;
                        Ok(())
                    }
                    IncrementalSyncOutcome::Applied { new_history_id, .. } => {
                        connections::finish_sync_success(&self.pool, connection.id, &new_history_id).await?;
                        self.queue.complete(job.id, Some(&new_history_id)).await?;
                        Ok(())
                    }
                }
            }
            other => Err(SyncError::Provider(format!("unknown sync_type: {other}"))),
        }
    }
}

impl Config {
    pub fn lock_timeout_as_chrono(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.lock_timeout).unwrap_or_else(|_| ChronoDuration::seconds(600))
    }
}
