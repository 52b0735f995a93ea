use async_trait::async_trait;

use crate::error::SyncError;

use super::{HistoryDelta, MessagePage, ParsedMessage, ProviderClient, ProviderLabel, RefreshedTokens, WatchResult};

/// Reserved for a future provider — same contract as
/// Gmail, implementation out of scope until Outlook support is prioritized.
pub struct OutlookClient;

#[async_trait]
impl ProviderClient for OutlookClient {
    async fn list_labels(&self, _access_token: &str) -> Result<Vec<ProviderLabel>, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }

    async fn list_messages(
        &self,
        _access_token: &str,
        _folder_provider_id: &str,
        _page_size: u32,
        _page_token: Option<&str>,
    ) -> Result<MessagePage, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }

    async fn get_message(&self, _access_token: &str, _message_id: &str) -> Result<ParsedMessage, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }

    async fn list_history(
        &self,
        _access_token: &str,
        _start_history_id: &str,
        _page_token: Option<&str>,
    ) -> Result<HistoryDelta, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }

    async fn watch(&self, _access_token: &str, _topic: &str) -> Result<WatchResult, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }

    async fn refresh_token(
        &self,
        _client_id: &str,
        _client_secret: &str,
        _refresh_token: &str,
    ) -> Result<RefreshedTokens, SyncError> {
        Err(SyncError::UnsupportedProvider("outlook".to_string()))
    }
}
