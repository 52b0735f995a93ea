mod support;

use mailsync_api::error::SyncError;
use mailsync_api::provider::gmail::GmailClient;
use mailsync_api::provider::ProviderClient;
use mailsync_api::store::{connections, folders};
use mailsync_api::sync_engine::full_sync;
use mailsync_api::token_manager::TokenManager;
use serde_json::json;
use support::TestApp;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gmail_message_json(id: &str, subject: &str) -> serde_json::Value {
    json!({
        "id": id,
        "labelIds": ["INBOX"],
        "snippet": subject,
        "internalDate": "1730000000000",
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                { "name": "Subject", "value": subject },
                { "name": "From", "value": "sender@example.com" },
            ],
        },
    })
}

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

async fn mount_labels(server: &MockServer, history_id: &str) {
    Mock::given(method("GET"))
        .and(path("/me/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "labels": [{ "id": "INBOX", "name": "INBOX" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/labels/INBOX"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "historyId": history_id })))
        .mount(server)
        .await;
}

async fn mount_folder_messages(server: &MockServer, label: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .and(query_param("labelIds", label))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
        })))
        .mount(server)
        .await;
    for id in ids {
        Mock::given(method("GET"))
            .and(path(format!("/me/messages/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message_json(id, "hello")))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn happy_full_sync_populates_default_folders_and_advances_cursor() {
    let gmail = MockServer::start().await;
    mount_token_refresh(&gmail).await;
    mount_labels(&gmail, "9000").await;
    mount_folder_messages(&gmail, "INBOX", &["m1", "m2"]).await;
    mount_folder_messages(&gmail, "SENT", &["m3"]).await;
    mount_folder_messages(&gmail, "DRAFT", &[]).await;
    mount_folder_messages(&gmail, "TRASH", &[]).await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-1", "stale-access-token", "a-refresh-token").await;
    let connection = connections::find_by_id(&app.pool, "user-1", connection_id).await.unwrap().unwrap();

    let client = GmailClient::with_token_endpoint(
        app.state.http.clone(),
        app.state.config.gmail_api_base.clone(),
        app.state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&app.pool, &app.state.cipher, app.state.config.as_ref());
    let queue = app.state.queue.clone();

    let job = queue.enqueue("user-1", connection_id, "gmail", "full", 1).await.unwrap();

    let result = full_sync::run(&app.pool, &client, &token_manager, &queue, job.id, &connection)
        .await
        .expect("full sync should succeed");
    queue.complete(job.id, Some(&result.latest_history_id)).await.unwrap();

    assert_eq!(result.latest_history_id, "9000");
    assert_eq!(result.messages_synced, 3);
    assert_eq!(result.folders_completed, 4);

    let completed = queue.find_by_id("user-1", job.id).await.unwrap().unwrap();
    assert_eq!(completed.status, "completed");
    assert_eq!(completed.progress, 100);
    assert_eq!(completed.messages_synced, 3);

    let folder_rows = folders::list_for_connection(&app.pool, connection_id).await.unwrap();
    assert_eq!(folder_rows.len(), 4);

    let refreshed = connections::find_by_id(&app.pool, "user-1", connection_id).await.unwrap().unwrap();
    assert_eq!(refreshed.latest_history_id.as_deref(), Some("9000"));
    assert_eq!(refreshed.sync_status, "idle");

    let cached: i64 = sqlx::query_scalar("SELECT count(*) FROM cached_messages WHERE connection_id = $1")
        .bind(connection_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 3);

    // Refreshed tokens are always persisted, even when the cached one hadn't expired.
    let decrypted_access = app.state.cipher.decrypt(&refreshed.access_token).unwrap();
    assert_eq!(decrypted_access, "fresh-access-token");
}

#[tokio::test]
async fn revoked_refresh_token_marks_connection_requires_reauth() {
    let gmail = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&gmail)
        .await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-2", "stale-access-token", "revoked-refresh-token").await;
    let connection = connections::find_by_id(&app.pool, "user-2", connection_id).await.unwrap().unwrap();

    let client = GmailClient::with_token_endpoint(
        app.state.http.clone(),
        app.state.config.gmail_api_base.clone(),
        app.state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&app.pool, &app.state.cipher, app.state.config.as_ref());
    let queue = app.state.queue.clone();
    let job = queue.enqueue("user-2", connection_id, "gmail", "full", 1).await.unwrap();

    let err = full_sync::run(&app.pool, &client, &token_manager, &queue, job.id, &connection)
        .await
        .expect_err("revoked token must fail the sync");
    queue.fail(job.id, &format!("token revoked: {err}")).await.unwrap();

    let failed = queue.find_by_id("user-2", job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, "failed");
    assert!(failed.status_message.unwrap().contains("revoked"));

    let refreshed = connections::find_by_id(&app.pool, "user-2", connection_id).await.unwrap().unwrap();
    assert_eq!(refreshed.sync_status, "requires_reauth");
    assert!(refreshed.sync_error.is_some());

    let cached: i64 = sqlx::query_scalar("SELECT count(*) FROM cached_messages WHERE connection_id = $1")
        .bind(connection_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 0);
}

#[tokio::test]
async fn cancelling_a_job_mid_sync_is_observed_and_cannot_be_overwritten_back_to_completed() {
    let gmail = MockServer::start().await;
    mount_token_refresh(&gmail).await;
    mount_labels(&gmail, "9000").await;

    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-11", "stale-access-token", "a-refresh-token").await;
    let connection = connections::find_by_id(&app.pool, "user-11", connection_id).await.unwrap().unwrap();

    let client = GmailClient::with_token_endpoint(
        app.state.http.clone(),
        app.state.config.gmail_api_base.clone(),
        app.state.config.gmail_token_endpoint.clone(),
    );
    let token_manager = TokenManager::new(&app.pool, &app.state.cipher, app.state.config.as_ref());
    let queue = app.state.queue.clone();

    let job = queue.enqueue("user-11", connection_id, "gmail", "full", 1).await.unwrap();
    assert!(queue.cancel("user-11", job.id).await.unwrap());

    let err = full_sync::run(&app.pool, &client, &token_manager, &queue, job.id, &connection)
        .await
        .expect_err("a cancelled job must stop the sync instead of running to completion");
    assert!(matches!(err, SyncError::JobCancelled));

    // A late-arriving success shouldn't be able to resurrect a job the user already cancelled.
    queue.complete(job.id, Some("9999")).await.unwrap();

    let row = queue.find_by_id("user-11", job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "cancelled");
}
