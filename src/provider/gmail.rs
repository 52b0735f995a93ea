use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::SyncError;

use super::{
    HistoryDelta, MessagePage, MessageSummary, ParsedMessage, ProviderClient, ProviderLabel,
    RefreshedTokens, WatchResult,
};

/// Plain `reqwest` client against the Gmail REST API — no generated SDK, the
/// same choice the pack makes for talking to Google's APIs from Rust.
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    token_endpoint: String,
}

impl GmailClient {
    /// `api_base` and `token_endpoint` both come from `Config` rather than
    /// being hardcoded, so tests can point either (or both) at a wiremock
    /// server without the client knowing it isn't talking to Google.
    pub fn with_token_endpoint(http: reqwest::Client, api_base: String, token_endpoint: String) -> Self {
        Self { http, api_base, token_endpoint }
    }

    fn users_url(&self, path: &str) -> String {
        format!("{}/me/{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("gmail request failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimitExceeded);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if body.to_lowercase().contains("invalid") && body.to_lowercase().contains("history") {
                return Err(SyncError::InvalidHistoryCursor);
            }
            if is_rate_limit_text(&body) {
                return Err(SyncError::RateLimitExceeded);
            }
            return Err(SyncError::Provider(format!("gmail returned {status}: {body}")));
        }
        Ok(resp)
    }
}

fn is_rate_limit_text(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("quota") || lower.contains("rate") || lower.contains("limit")
}

#[derive(Debug, Deserialize)]
struct LabelsResponse {
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelDetail {
    #[serde(rename = "historyId")]
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesListResponse {
    messages: Option<Vec<MessageIdEntry>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageIdEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct GmailMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds")]
    pub label_ids: Option<Vec<String>>,
    pub snippet: Option<String>,
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    pub headers: Option<Vec<Header>>,
    pub body: Option<PayloadBody>,
    pub parts: Option<Vec<MessagePart>>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub body: Option<PayloadBody>,
}

#[derive(Debug, Deserialize)]
pub struct PayloadBody {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Pulls the headers Gmail messages need mapped to `cached_messages` columns
/// and decodes the first `text/html` part found, if any.
pub fn parse_message(msg: &GmailMessage) -> ParsedMessage {
    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .cloned()
        .unwrap_or_default();

    let header = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let recipients = header("To")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();
    let cc = header("Cc")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let body_html = extract_mime_part(msg.payload.as_ref(), "text/html");
    let label_ids = msg.label_ids.clone().unwrap_or_default();

    ParsedMessage {
        provider_email_id: msg.id.clone(),
        subject: header("Subject"),
        sender: header("From"),
        recipients,
        cc,
        date: parse_internal_date(msg.internal_date.as_deref()),
        body_html,
        body_preview: msg.snippet.clone(),
        read: !label_ids.iter().any(|l| l == "UNREAD"),
        starred: label_ids.iter().any(|l| l == "STARRED"),
        attachments: json!([]),
        label_ids,
    }
}

fn extract_mime_part(payload: Option<&MessagePayload>, mime_type: &str) -> Option<String> {
    let payload = payload?;
    if payload.mime_type.as_deref() == Some(mime_type) {
        return decode_body(payload.body.as_ref());
    }
    for part in payload.parts.iter().flatten() {
        if part.mime_type.as_deref() == Some(mime_type) {
            return decode_body(part.body.as_ref());
        }
    }
    None
}

fn decode_body(body: Option<&PayloadBody>) -> Option<String> {
    use base64::Engine;
    let data = body?.data.as_ref()?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

fn parse_internal_date(raw: Option<&str>) -> Option<chrono::DateTime<Utc>> {
    let raw = raw?;
    let ms: i64 = raw.parse().ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

#[derive(Debug, Deserialize)]
struct HistoryListResponse {
    history: Option<Vec<HistoryEntry>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "historyId")]
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(rename = "messagesAdded")]
    messages_added: Option<Vec<HistoryMessageRef>>,
    #[serde(rename = "messagesDeleted")]
    messages_deleted: Option<Vec<HistoryMessageRef>>,
    #[serde(rename = "labelsAdded")]
    labels_added: Option<Vec<HistoryMessageRef>>,
    #[serde(rename = "labelsRemoved")]
    labels_removed: Option<Vec<HistoryMessageRef>>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessageRef {
    message: HistoryMessageId,
}

#[derive(Debug, Deserialize)]
struct HistoryMessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WatchResponse {
    #[serde(rename = "historyId")]
    history_id: String,
    expiration: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[async_trait]
impl ProviderClient for GmailClient {
    async fn list_labels(&self, access_token: &str) -> Result<Vec<ProviderLabel>, SyncError> {
        let resp: LabelsResponse = self
            .send(self.http.get(self.users_url("labels")).bearer_auth(access_token))
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("decode labels: {e}")))?;

        let mut labels = Vec::with_capacity(resp.labels.len());
        for entry in resp.labels {
            let detail: LabelDetail = self
                .send(
                    self.http
                        .get(self.users_url(&format!("labels/{}", entry.id)))
                        .bearer_auth(access_token),
                )
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Provider(format!("decode label detail: {e}")))?;
            labels.push(ProviderLabel {
                id: entry.id,
                name: entry.name,
                history_id: detail.history_id,
            });
        }
        Ok(labels)
    }

    async fn list_messages(
        &self,
        access_token: &str,
        folder_provider_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, SyncError> {
        let mut req = self
            .http
            .get(self.users_url("messages"))
            .bearer_auth(access_token)
            .query(&[("labelIds", folder_provider_id), ("maxResults", &page_size.to_string())]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }
        let resp: MessagesListResponse = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("decode messages list: {e}")))?;
        Ok(MessagePage {
            messages: resp
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| MessageSummary { provider_email_id: m.id })
                .collect(),
            next_page_token: resp.next_page_token,
        })
    }

    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<ParsedMessage, SyncError> {
        let msg: GmailMessage = self
            .send(
                self.http
                    .get(self.users_url(&format!("messages/{message_id}")))
                    .query(&[("format", "full")])
                    .bearer_auth(access_token),
            )
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("decode message: {e}")))?;
        Ok(parse_message(&msg))
    }

    async fn list_history(
        &self,
        access_token: &str,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryDelta, SyncError> {
        let mut req = self
            .http
            .get(self.users_url("history"))
            .bearer_auth(access_token)
            .query(&[
                ("startHistoryId", start_history_id),
                ("historyTypes", "messageAdded"),
            ])
            .query(&[("historyTypes", "messageDeleted")])
            .query(&[("historyTypes", "labelAdded")])
            .query(&[("historyTypes", "labelRemoved")]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }
        let resp: HistoryListResponse = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("decode history: {e}")))?;

        let mut delta = HistoryDelta {
            next_page_token: resp.next_page_token,
            history_id: resp.history_id,
            ..Default::default()
        };
        for entry in resp.history.unwrap_or_default() {
            delta
                .added
                .extend(entry.messages_added.into_iter().flatten().map(|m| m.message.id));
            delta
                .deleted
                .extend(entry.messages_deleted.into_iter().flatten().map(|m| m.message.id));
            delta
                .updated
                .extend(entry.labels_added.into_iter().flatten().map(|m| m.message.id));
            delta
                .updated
                .extend(entry.labels_removed.into_iter().flatten().map(|m| m.message.id));
        }
        Ok(delta)
    }

    async fn watch(&self, access_token: &str, topic: &str) -> Result<WatchResult, SyncError> {
        let resp: WatchResponse = self
            .send(
                self.http
                    .post(self.users_url("watch"))
                    .bearer_auth(access_token)
                    .json(&json!({ "labelIds": ["INBOX"], "topicName": topic })),
            )
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("decode watch response: {e}")))?;

        let expiration_ms: i64 = resp
            .expiration
            .parse()
            .map_err(|_| SyncError::Provider("watch response had non-numeric expiration".into()))?;
        let expiration = Utc
            .timestamp_millis_opt(expiration_ms)
            .single()
            .ok_or_else(|| SyncError::Provider("watch expiration out of range".into()))?;

        Ok(WatchResult {
            resource_id: resp.history_id.clone(),
            history_id: resp.history_id,
            expiration,
        })
    }

    async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, SyncError> {
        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("token refresh request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let error = body.get("error").and_then(|v| v.as_str()).unwrap_or("");
            if error == "invalid_grant" {
                return Err(SyncError::ProviderTokenRevoked(
                    "refresh token rejected with invalid_grant".to_string(),
                ));
            }
            return Err(SyncError::TokenRefreshTransient(format!(
                "token endpoint returned 400: {body}"
            )));
        }
        if !resp.status().is_success() {
            return Err(SyncError::TokenRefreshTransient(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::TokenRefreshTransient(format!("decode token response: {e}")))?;

        Ok(RefreshedTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_else(|| refresh_token.to_string()),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_internal_date_millis() {
        let dt = parse_internal_date(Some("1730000000000")).unwrap();
        assert_eq!(dt.timestamp_millis(), 1730000000000);
    }

    #[test]
    fn parse_message_extracts_headers_and_flags() {
        let msg = GmailMessage {
            id: "msg-1".into(),
            thread_id: Some("thr-1".into()),
            label_ids: Some(vec!["INBOX".into(), "UNREAD".into()]),
            snippet: Some("hi".into()),
            internal_date: Some("1730000000000".into()),
            payload: Some(MessagePayload {
                headers: Some(vec![
                    Header { name: "Subject".into(), value: "Hello".into() },
                    Header { name: "From".into(), value: "a@example.com".into() },
                    Header { name: "To".into(), value: "b@example.com, c@example.com".into() },
                ]),
                body: None,
                parts: None,
                mime_type: Some("text/plain".into()),
            }),
        };
        let parsed = parse_message(&msg);
        assert_eq!(parsed.subject.as_deref(), Some("Hello"));
        assert_eq!(parsed.recipients, vec!["b@example.com", "c@example.com"]);
        assert!(!parsed.read);
    }
}
