use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::watch_manager::WatchManager;

#[derive(Debug, Deserialize, Default)]
pub struct GmailNotificationBody {
    #[serde(rename = "historyId", default)]
    pub history_id: Option<String>,
}

/// POST /webhooks/gmail
///
/// Reachable without a bearer token — the auth middleware skips `/webhooks/`
/// paths. When `GMAIL_WEBHOOK_SHARED_SECRET` is configured, delivery must
/// carry it back as `X-Goog-Channel-Token`; unset, every delivery is
/// accepted. Only `resource-state: exists` triggers an incremental sync —
/// `sync` and other lifecycle states are acknowledged with a no-op 200.
pub async fn gmail(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<GmailNotificationBody>>,
) -> StatusCode {
    if let Some(expected) = &state.config.gmail_webhook_shared_secret {
        let provided = headers.get("x-goog-channel-token").and_then(|v| v.to_str().ok());
        let matches = provided.is_some_and(|p| constant_time_eq(p.as_bytes(), expected.as_bytes()));
        if !matches {
            tracing::warn!("rejected gmail webhook delivery with missing or invalid shared secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let resource_state = headers
        .get("x-goog-resource-state")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("exists");
    if resource_state != "exists" {
        return StatusCode::OK;
    }

    let Some(resource_id) = headers.get("x-goog-resource-id").and_then(|v| v.to_str().ok()) else {
        tracing::warn!("gmail webhook delivery missing x-goog-resource-id header");
        return StatusCode::OK;
    };

    let history_id = body.and_then(|b| b.0.history_id).unwrap_or_default();

    let watch_manager = WatchManager::new(&state.pool, &state.http, &state.cipher, &state.config);
    if let Err(e) = watch_manager.on_notification(resource_id, &history_id).await {
        // Always acknowledge with 200 — the push provider retries on non-2xx
        // and would otherwise hammer a connection already in a failing state.
        tracing::error!(error = %e, resource_id, "failed to process gmail push notification");
    }
    StatusCode::OK
}

/// Byte-for-byte compare that doesn't short-circuit on the first mismatch,
/// so the shared-secret check doesn't leak how many leading bytes matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_identical_secrets() {
        assert!(constant_time_eq(b"shared-secret", b"shared-secret"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_secrets() {
        assert!(!constant_time_eq(b"shared-secret", b"wrong-secret"));
        assert!(!constant_time_eq(b"short", b"a-much-longer-value"));
    }
}
