mod support;

use chrono::{Duration, Utc};
use mailsync_api::store::folders;
use mailsync_api::watch_manager::WatchManager;
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

async fn mount_single_message_delta(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "historyId": "9100",
            "history": [
                { "messagesAdded": [{ "message": { "id": "pushed-1" } }] }
            ],
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/messages/pushed-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pushed-1",
            "labelIds": ["INBOX"],
            "snippet": "pushed",
            "internalDate": "1730000002000",
            "payload": { "mimeType": "text/plain", "headers": [] },
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn duplicate_push_notifications_for_the_same_history_id_are_idempotent() {
    let gmail = MockServer::start().await;
    mount_token_refresh(&gmail).await;
    mount_single_message_delta(&gmail).await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-8", "access-token", "a-refresh-token").await;
    folders::seed_defaults_if_absent(&app.pool, "user-8", connection_id).await.unwrap();
    sqlx::query(
        "UPDATE connections SET watch_resource_id = $2, watch_history_id = $3, watch_expiration = $4 WHERE id = $1",
    )
    .bind(connection_id)
    .bind("watch-resource-1")
    .bind("9000")
    .bind(Utc::now() + Duration::days(7))
    .execute(&app.pool)
    .await
    .unwrap();

    let watch_manager = WatchManager::new(
        &app.pool,
        &app.state.http,
        &app.state.cipher,
        app.state.config.as_ref(),
    );

    // Two rapid, duplicate deliveries of the same push notification.
    watch_manager.on_notification("watch-resource-1", "9100").await.unwrap();
    watch_manager.on_notification("watch-resource-1", "9100").await.unwrap();

    let cached: i64 = sqlx::query_scalar("SELECT count(*) FROM cached_messages WHERE connection_id = $1")
        .bind(connection_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 1);

    let stored_subject: String =
        sqlx::query_scalar("SELECT body_preview FROM cached_messages WHERE connection_id = $1")
            .bind(connection_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(stored_subject, "pushed");
}

#[tokio::test]
async fn notification_for_unknown_resource_id_is_reported_as_connection_not_found() {
    let gmail = MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;

    let watch_manager = WatchManager::new(
        &app.pool,
        &app.state.http,
        &app.state.cipher,
        app.state.config.as_ref(),
    );

    let err = watch_manager
        .on_notification("no-such-resource", "1")
        .await
        .expect_err("an unknown resource id must not be silently ignored");
    assert!(matches!(err, mailsync_api::error::SyncError::ConnectionNotFound));
}
