pub mod gmail;
pub mod outlook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A provider message already reduced to the fields `cached_messages` stores.
/// Every ProviderClient implementation converges on this shape so Store has a
/// single write contract regardless of which provider produced it.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
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
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub provider_email_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderLabel {
    pub id: String,
    pub name: String,
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryDelta {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub updated: Vec<String>,
    pub next_page_token: Option<String>,
    pub history_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchResult {
    pub resource_id: String,
    pub history_id: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Outlook,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            other => Err(SyncError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
        }
    }
}

/// Abstracts a remote mail provider. Gmail is
/// implemented; Outlook is a stub returning `UnsupportedProvider` from every
/// method, matching the "interface with two variants" design note.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn list_labels(&self, access_token: &str) -> Result<Vec<ProviderLabel>, SyncError>;

    async fn list_messages(
        &self,
        access_token: &str,
        folder_provider_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, SyncError>;

    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<ParsedMessage, SyncError>;

    async fn list_history(
        &self,
        access_token: &str,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryDelta, SyncError>;

    async fn watch(&self, access_token: &str, topic: &str) -> Result<WatchResult, SyncError>;

    async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, SyncError>;
}

pub fn client_for(
    provider: Provider,
    http: reqwest::Client,
    api_base: String,
    token_endpoint: String,
) -> Box<dyn ProviderClient> {
    match provider {
        Provider::Gmail => Box::new(gmail::GmailClient::with_token_endpoint(http, api_base, token_endpoint)),
        Provider::Outlook => Box::new(outlook::OutlookClient),
    }
}
