use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailsync_api::config::Config;
use mailsync_api::crypto::TokenCipher;
use mailsync_api::job_queue::JobQueue;
use mailsync_api::scheduler::Scheduler;
use mailsync_api::state::AppState;
use mailsync_api::worker::Worker;
use mailsync_api::{routes, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mailsync=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let connect_opts = config
        .database_url
        .parse::<sqlx::postgres::PgConnectOptions>()?
        .statement_cache_capacity(0);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect_with(connect_opts)
        .await?;

    tracing::info!("connected to database");

    run_migrations(&pool).await?;
    tracing::info!("migrations applied");

    let cipher = TokenCipher::new(&config.token_encryption_key);
    let http = reqwest::Client::new();
    let queue = JobQueue::new(pool.clone());
    let config = Arc::new(config);

    let state = AppState {
        pool: pool.clone(),
        http: http.clone(),
        cipher: cipher.clone(),
        config: config.clone(),
        queue: queue.clone(),
    };

    // Background worker — claims and executes sync_jobs rows.
    let worker = Arc::new(Worker::new(pool.clone(), cipher.clone(), (*config).clone()));
    worker.register().await?;
    let _heartbeat = worker.clone().spawn_heartbeat();
    let worker_for_run = worker.clone();
    tokio::spawn(async move {
        worker_for_run.run().await;
    });

    // Background scheduler — sweeps due incremental syncs, reaps dead
    // workers, and renews push watches on independent ticks.
    let scheduler = Arc::new(Scheduler::new(pool.clone(), cipher.clone(), (*config).clone()));
    let _scheduler_tasks = scheduler.spawn_all();

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", routes::api_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("mailsync listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(worker))
        .await?;

    Ok(())
}

async fn shutdown_signal(worker: Arc<Worker>) {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, releasing claimed jobs");
    worker.shutdown();
}
