mod support;

use mailsync_api::provider::gmail::GmailClient;
use mailsync_api::store::{connections, folders};
use mailsync_api::sync_engine::incremental_sync::{self, IncrementalSyncOutcome};
use mailsync_api::token_manager::TokenManager;
use serde_json::json;
use support::TestApp;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token_refresh(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access-token",
            "refresh_token": "fresh-refresh-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn invalid_history_cursor_requires_full_sync_and_leaves_cache_untouched() {
    let gmail = MockServer::start().await;
    mount_token_refresh(&gmail).await;
    Mock::given(method("GET"))
        .and(path("/me/history"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "Invalid historyId value provided in request" }
        })))
        .mount(&gmail)
        .await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-3", "stale-access-token", "a-refresh-token").await;
    let connection = connections::find_by_id(&app.pool, "user-3", connection_id).await.unwrap().unwrap();

    let client = GmailClient::with_token_endpoint(
        app.state.http.clone(),
        app.state.config.gmail_api_base.clone(),
        app.state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&app.pool, &app.state.cipher, app.state.config.as_ref());

    let outcome = incremental_sync::run(&app.pool, &client, &token_manager, &connection, "stale-cursor", None)
        .await
        .expect("an invalid cursor must be reported as an outcome, not an error");

    assert!(matches!(outcome, IncrementalSyncOutcome::RequiresFullSync));

    let cached: i64 = sqlx::query_scalar("SELECT count(*) FROM cached_messages WHERE connection_id = $1")
        .bind(connection_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 0);
}

#[tokio::test]
async fn applied_delta_partitions_added_deleted_and_updated_with_add_precedence() {
    let gmail = MockServer::start().await;
    mount_token_refresh(&gmail).await;

    Mock::given(method("GET"))
        .and(path("/me/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "historyId": "9500",
            "history": [
                {
                    "messagesAdded": [{ "message": { "id": "m-new" } }],
                    "messagesDeleted": [{ "message": { "id": "m-gone" } }],
                    "labelsAdded": [{ "message": { "id": "m-new" } }],
                    "labelsRemoved": [{ "message": { "id": "m-touched" } }],
                }
            ],
        })))
        .mount(&gmail)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/messages/m-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m-new",
            "labelIds": ["INBOX"],
            "snippet": "hi",
            "internalDate": "1730000000000",
            "payload": { "mimeType": "text/plain", "headers": [] },
        })))
        .mount(&gmail)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/messages/m-touched"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m-touched",
            "labelIds": ["INBOX"],
            "snippet": "hi again",
            "internalDate": "1730000001000",
            "payload": { "mimeType": "text/plain", "headers": [] },
        })))
        .mount(&gmail)
        .await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-4", "stale-access-token", "a-refresh-token").await;
    folders::seed_defaults_if_absent(&app.pool, "user-4", connection_id).await.unwrap();
    let connection = connections::find_by_id(&app.pool, "user-4", connection_id).await.unwrap().unwrap();

    let client = GmailClient::with_token_endpoint(
        app.state.http.clone(),
        app.state.config.gmail_api_base.clone(),
        app.state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&app.pool, &app.state.cipher, app.state.config.as_ref());

    let outcome = incremental_sync::run(&app.pool, &client, &token_manager, &connection, "9000", None)
        .await
        .expect("delta with a valid cursor must apply");

    match outcome {
        IncrementalSyncOutcome::Applied { new_history_id, added, deleted, updated } => {
            assert_eq!(new_history_id, "9500");
            // m-new is in both added and labelsAdded; precedence keeps it counted once as added.
            assert_eq!(added, 1);
            assert_eq!(deleted, 1);
            assert_eq!(updated, 1);
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    let cached: i64 = sqlx::query_scalar("SELECT count(*) FROM cached_messages WHERE connection_id = $1")
        .bind(connection_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 2);
}
