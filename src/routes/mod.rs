use axum::{middleware as axum_mw, routing::post, Router};

use crate::middleware::{auth_middleware, security::security_headers};
use crate::state::AppState;

pub mod connections;
pub mod sync;
pub mod webhooks;

/// Everything except `/health` — mounted under `/api/v1` by `main.rs`. The
/// health probe is mounted separately at the root so it stays reachable
/// without the `/api/v1` prefix and without tripping the auth layer.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/email-connections", axum::routing::get(connections::list).post(connections::create))
        .route("/email-connections/{id}/status", axum::routing::get(connections::status))
        .route("/email-connections/{id}", axum::routing::delete(connections::remove))
        .route("/sync/full", post(sync::enqueue_full))
        .route("/sync/incremental", post(sync::run_incremental))
        .route("/sync/on-demand", post(sync::on_demand))
        .route("/sync/status/{id}", axum::routing::get(sync::status))
        .route("/sync/cancel/{id}", post(sync::cancel))
        .route("/sync/history", axum::routing::get(sync::history))
        .route("/webhooks/gmail", post(webhooks::gmail))
        .layer(axum_mw::from_fn_with_state(state.clone(), auth_middleware))
        .layer(axum_mw::from_fn(security_headers))
        .with_state(state)
}
