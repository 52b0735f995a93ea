mod support;

use chrono::Duration;
use support::TestApp;

#[tokio::test]
async fn enqueuing_a_second_job_for_the_same_connection_reports_the_existing_one() {
    let gmail = wiremock::MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-5", "access-token", "refresh-token").await;
    let queue = app.state.queue.clone();

    let first = queue.enqueue("user-5", connection_id, "gmail", "full", 1).await.unwrap();

    let err = queue
        .enqueue("user-5", connection_id, "gmail", "full", 1)
        .await
        .expect_err("a connection already mid-sync must not accept a second job");

    match err {
        mailsync_api::error::SyncError::ConflictingJobInProgress { existing_job_id } => {
            assert_eq!(existing_job_id, first.id);
        }
        other => panic!("expected ConflictingJobInProgress, got {other:?}"),
    }
}

#[tokio::test]
async fn abandoned_job_is_reclaimed_by_a_different_worker_after_the_lock_times_out() {
    let gmail = wiremock::MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-6", "access-token", "refresh-token").await;
    let queue = app.state.queue.clone();

    let job = queue.enqueue("user-6", connection_id, "gmail", "full", 1).await.unwrap();

    let claimed_by_a = queue.claim_next("worker-a", 10).await.unwrap();
    assert_eq!(claimed_by_a.len(), 1);
    assert_eq!(claimed_by_a[0].id, job.id);

    // worker-a goes silent: backdate updated_at so it looks stale to reclaim_abandoned
    // without needing to actually sleep past the lock timeout in a test.
    sqlx::query("UPDATE sync_jobs SET updated_at = now() - interval '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let reclaimed = queue
        .reclaim_abandoned("worker-b", Duration::seconds(2), 10)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, job.id);
    assert_eq!(reclaimed[0].worker_id.as_deref(), Some("worker-b"));

    let row = queue.find_by_id("user-6", job.id).await.unwrap().unwrap();
    assert_eq!(row.worker_id.as_deref(), Some("worker-b"));
    assert_eq!(row.status, "in_progress");
}

#[tokio::test]
async fn a_job_whose_owner_is_still_fresh_is_not_reclaimed() {
    let gmail = wiremock::MockServer::start().await;
    let app = TestApp::spawn(&gmail.uri(), &format!("{}/token", gmail.uri())).await;
    let connection_id = app.seed_connection("user-7", "access-token", "refresh-token").await;
    let queue = app.state.queue.clone();

    let job = queue.enqueue("user-7", connection_id, "gmail", "full", 1).await.unwrap();
    queue.claim_next("worker-a", 10).await.unwrap();

    let reclaimed = queue
        .reclaim_abandoned("worker-b", Duration::seconds(300), 10)
        .await
        .unwrap();
    assert!(reclaimed.is_empty());

    let row = queue.find_by_id("user-7", job.id).await.unwrap().unwrap();
    assert_eq!(row.worker_id.as_deref(), Some("worker-a"));
}
