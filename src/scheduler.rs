use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::job_queue::JobQueue;
use crate::provider::Provider;
use crate::store::{connections, locks, workers};
use crate::watch_manager::WatchManager;

const INCREMENTAL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const REAP_INTERVAL: Duration = Duration::from_secs(60);
const WATCH_RENEWAL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const LOCK_BUCKET_MINUTES: i64 = 5;

/// Three periodic tasks, each guarded by a named DistLock so only one
/// replica executes it per time bucket. Each runs as its own
/// `tokio::spawn`ed loop, one per concern.
pub struct Scheduler {
    pool: PgPool,
    http: reqwest::Client,
    cipher: TokenCipher,
    config: Config,
}

impl Scheduler {
    pub fn new(pool: PgPool, cipher: TokenCipher, config: Config) -> Self {
        Self { pool, http: reqwest::Client::new(), cipher, config }
    }

    pub fn spawn_all(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move { scheduler.run_incremental_sweep_loop().await })
            },
            {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move { scheduler.run_reap_loop().await })
            },
            {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move { scheduler.run_watch_renewal_loop().await })
            },
        ]
    }

    async fn run_incremental_sweep_loop(&self) {
        loop {
            tokio::time::sleep(INCREMENTAL_SWEEP_INTERVAL).await;
            if let Err(e) = self.enqueue_due_incremental_syncs().await {
                tracing::error!(error = %e, "incremental sync sweep failed");
            }
        }
    }

    async fn run_reap_loop(&self) {
        loop {
            tokio::time::sleep(REAP_INTERVAL).await;
            if let Err(e) = self.reap_inactive_workers().await {
                tracing::error!(error = %e, "worker reap failed");
            }
        }
    }

    async fn run_watch_renewal_loop(&self) {
        loop {
            tokio::time::sleep(WATCH_RENEWAL_INTERVAL).await;
            if let Err(e) = self.renew_expiring_watches().await {
                tracing::error!(error = %e, "watch renewal sweep failed");
            }
        }
    }

    /// Encodes the task name and the current 5-minute time bucket into the
    /// lock id, e.g. `sync-lock-incremental-2026-07-31T14:35` — this is what
    /// makes acquiring the lock safe under horizontal scaling.
    fn lock_id(&self, task: &str) -> String {
        let now = Utc::now();
        let bucket_minute = (now.format("%M").to_string().parse::<i64>().unwrap_or(0) / LOCK_BUCKET_MINUTES)
            * LOCK_BUCKET_MINUTES;
        format!("{task}-{}", now.format(&format!("%Y-%m-%dT%H:{bucket_minute:02}")))
    }

    async fn enqueue_due_incremental_syncs(&self) -> anyhow::Result<()> {
        let lock_id = self.lock_id("sync-lock-incremental");
        if !locks::try_acquire(&self.pool, &lock_id, ChronoDuration::minutes(LOCK_BUCKET_MINUTES)).await? {
            return Ok(());
        }

        let due = connections::find_due_for_incremental_sync(&self.pool).await?;
        let queue = JobQueue::new(self.pool.clone());
        for connection in due {
            match queue.enqueue(&connection.user_id, connection.id, &connection.provider, "incremental", 2).await {
                Ok(_) | Err(crate::error::SyncError::ConflictingJobInProgress { .. }) => {}
                Err(e) => tracing::warn!(connection_id = %connection.id, error = %e, "failed to enqueue scheduled incremental sync"),
            }
        }

        locks::release(&self.pool, &lock_id).await?;
        Ok(())
    }

    async fn reap_inactive_workers(&self) -> anyhow::Result<()> {
        let lock_id = self.lock_id("sync-lock-reap");
        if !locks::try_acquire(&self.pool, &lock_id, ChronoDuration::minutes(1)).await? {
            return Ok(());
        }

        let timeout_secs = self.config.worker_heartbeat_timeout.as_secs() as i64;
        let inactive = workers::reap_inactive(&self.pool, timeout_secs).await?;
        for worker in inactive {
            sqlx::query(
                r#"UPDATE sync_jobs SET worker_id = NULL,
                     status_message = 'worker went inactive', updated_at = now()
                   WHERE worker_id = $1 AND status = 'in_progress'"#,
            )
            .bind(&worker.worker_id)
            .execute(&self.pool)
            .await?;
        }

        locks::release(&self.pool, &lock_id).await?;
        Ok(())
    }

    async fn renew_expiring_watches(&self) -> anyhow::Result<()> {
        let lock_id = self.lock_id("sync-lock-watch-renewal");
        if !locks::try_acquire(&self.pool, &lock_id, ChronoDuration::hours(1)).await? {
            return Ok(());
        }

        let expiring = connections::find_watches_expiring_within(
            &self.pool,
            Provider::Gmail.as_str(),
            ChronoDuration::hours(24),
        )
        .await?;

        let watch_manager = WatchManager::new(&self.pool, &self.http, &self.cipher, &self.config);
        for connection in expiring {
            if let Err(e) = watch_manager.renew(&connection).await {
                tracing::warn!(connection_id = %connection.id, error = %e, "failed to renew watch");
            }
        }

        locks::release(&self.pool, &lock_id).await?;
        Ok(())
    }
}
