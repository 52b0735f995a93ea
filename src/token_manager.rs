use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::error::SyncError;
use crate::models::Connection;
use crate::provider::{Provider, ProviderClient};
use crate::store::connections;

/// Refresh skew — tokens are renewed this far ahead of their stated expiry.
const REFRESH_SKEW: Duration = Duration::minutes(5);

/// Wraps `ProviderClient::refresh_token`, classifying the result into the
/// three outcomes that change caller behavior and persisting on success
/// before returning, so a crash between refresh and persist never loses a
/// rotated refresh_token without also losing the access_token it paired with.
pub struct TokenManager<'a> {
    pool: &'a PgPool,
    cipher: &'a TokenCipher,
    config: &'a Config,
}

impl<'a> TokenManager<'a> {
    pub fn new(pool: &'a PgPool, cipher: &'a TokenCipher, config: &'a Config) -> Self {
        Self { pool, cipher, config }
    }

    /// Always calls the provider, even if the stored token looks unexpired —
    /// Catches silently revoked tokens before a sync starts.
    /// A transient failure on an otherwise-unexpired token falls back to the
    /// cached access_token rather than failing a sync that didn't need a new one;
    /// revocation always propagates regardless of remaining lifetime.
    pub async fn ensure_fresh(
        &self,
        connection: &Connection,
        provider_client: &dyn ProviderClient,
    ) -> Result<String, SyncError> {
        match self.do_refresh(connection, provider_client).await {
            Ok(token) => Ok(token),
            Err(SyncError::ProviderTokenRevoked(reason)) => Err(SyncError::ProviderTokenRevoked(reason)),
            Err(transient) if connection.token_expires_at > Utc::now() + REFRESH_SKEW => {
                tracing::warn!(connection_id = %connection.id, error = %transient, "refresh failed but cached token still valid");
                self.cipher
                    .decrypt(&connection.access_token)
                    .map_err(|e| SyncError::Provider(format!("decrypt cached access token: {e}")))
            }
            Err(transient) => Err(transient),
        }
    }

    async fn do_refresh(
        &self,
        connection: &Connection,
        provider_client: &dyn ProviderClient,
    ) -> Result<String, SyncError> {
        let provider = Provider::parse(&connection.provider)?;
        let refresh_token = self
            .cipher
            .decrypt(&connection.refresh_token)
            .map_err(|e| SyncError::Provider(format!("decrypt refresh token: {e}")))?;

        let (client_id, client_secret) = match provider {
            Provider::Gmail => (&self.config.google_client_id, &self.config.google_client_secret),
            Provider::Outlook => return Err(SyncError::UnsupportedProvider("outlook".to_string())),
        };

        match provider_client
            .refresh_token(client_id, client_secret, &refresh_token)
            .await
        {
            Ok(fresh) => {
                let access_enc = self.cipher.encrypt(&fresh.access_token);
                let refresh_enc = self.cipher.encrypt(&fresh.refresh_token);
                connections::set_tokens(self.pool, connection.id, &access_enc, &refresh_enc, fresh.expires_at)
                    .await?;
                Ok(fresh.access_token)
            }
            Err(SyncError::ProviderTokenRevoked(reason)) => {
                connections::mark_requires_reauth(self.pool, connection.id, &reason).await?;
                Err(SyncError::ProviderTokenRevoked(reason))
            }
            Err(SyncError::TokenRefreshTransient(reason)) => {
                Err(SyncError::TokenRefreshTransient(reason))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_skew_is_five_minutes() {
        assert_eq!(REFRESH_SKEW, Duration::minutes(5));
    }
}
