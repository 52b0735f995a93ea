use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::error::SyncError;
use crate::models::Connection;
use crate::provider::{self, Provider};
use crate::store::connections;
use crate::sync_engine::incremental_sync::{self, IncrementalSyncOutcome};
use crate::token_manager::TokenManager;

pub struct WatchManager<'a> {
    pool: &'a PgPool,
    http: &'a reqwest::Client,
    cipher: &'a TokenCipher,
    config: &'a Config,
}

impl<'a> WatchManager<'a> {
    pub fn new(pool: &'a PgPool, http: &'a reqwest::Client, cipher: &'a TokenCipher, config: &'a Config) -> Self {
        Self { pool, http, cipher, config }
    }

    pub async fn install(&self, connection: &Connection) -> Result<(), SyncError> {
        let provider = Provider::parse(&connection.provider)?;
        let client = provider::client_for(
        provider,
        self.http.clone(),
        self.config.gmail_api_base.clone(),
        self.config.gmail_token_endpoint.clone(),
    );
        let token_manager = TokenManager::new(self.pool, self.cipher, self.config);
        let access_token = token_manager.ensure_fresh(connection, client.as_ref()).await?;

        let watch = client.watch(&access_token, &self.config.gmail_pubsub_topic).await?;
        connections::set_watch(self.pool, connection.id, &watch.resource_id, &watch.history_id, watch.expiration)
            .await?;
        Ok(())
    }

    /// Identical to `install` — providers typically expire watches in ~7
    /// days, so callers renew once under 24h remains.
    pub async fn renew(&self, connection: &Connection) -> Result<(), SyncError> {
        self.install(connection).await
    }

    pub fn is_expiring(connection: &Connection) -> bool {
        match connection.watch_expiration {
            Some(expiration) => expiration < Utc::now() + Duration::hours(24),
            None => true,
        }
    }

    /// Locates the owning connection by watch_resource_id and applies the
    /// delta since `watch_history_id` — the received id is only advisory
    /// The received id is only advisory, which makes duplicate/out-of-order
    /// push deliveries idempotent.
    pub async fn on_notification(
        &self,
        resource_id: &str,
        _received_history_id: &str,
    ) -> Result<Option<IncrementalSyncOutcome>, SyncError> {
        let connection = connections::find_by_watch_resource_id(self.pool, resource_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound)?;

        let start_cursor = match &connection.watch_history_id {
            Some(id) => id.clone(),
            None => return Ok(None),
        };

        let provider = Provider::parse(&connection.provider)?;
        let client = provider::client_for(
        provider,
        self.http.clone(),
        self.config.gmail_api_base.clone(),
        self.config.gmail_token_endpoint.clone(),
    );
        let token_manager = TokenManager::new(self.pool, self.cipher, self.config);

        let outcome = incremental_sync::run(
            self.pool,
            client.as_ref(),
            &token_manager,
            &connection,
            &start_cursor,
            None,
        )
        .await?;

        if let IncrementalSyncOutcome::Applied { new_history_id, .. } = &outcome {
            connections::set_watch_history_id(self.pool, connection.id, new_history_id).await?;
        }

        if Self::is_expiring(&connection) {
            if let Err(e) = self.renew(&connection).await {
                tracing::warn!(connection_id = %connection.id, error = %e, "failed to renew watch on push activity");
            }
        }

        Ok(Some(outcome))
    }
}
