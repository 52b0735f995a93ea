mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mailsync_api::routes;
use serde_json::{json, Value};
use support::{bearer_token, TestApp};
use tower::ServiceExt;

async fn post_json(app: axum::Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, parsed)
}

#[tokio::test]
async fn posting_full_sync_twice_reports_the_already_running_job_instead_of_erroring() {
    let gmail = wiremock::MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-9", "access-token", "refresh-token").await;
    let token = bearer_token("user-9");

    let body = json!({ "connectionId": connection_id });

    let (status1, parsed1) =
        post_json(routes::api_router(app.state.clone()), "/sync/full", &token, body.clone()).await;
    assert_eq!(status1, StatusCode::OK);
    assert_eq!(parsed1["data"]["alreadyRunning"], json!(false));
    let first_sync_id = parsed1["data"]["syncId"].clone();

    let (status2, parsed2) =
        post_json(routes::api_router(app.state.clone()), "/sync/full", &token, body).await;
    assert_eq!(status2, StatusCode::OK);
    assert_eq!(parsed2["data"]["alreadyRunning"], json!(true));
    assert_eq!(parsed2["data"]["syncId"], first_sync_id);
}

#[tokio::test]
async fn missing_bearer_token_is_rejected_before_reaching_the_handler() {
    let gmail = wiremock::MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-10", "access-token", "refresh-token").await;

    let response = routes::api_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync/full")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "connectionId": connection_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
