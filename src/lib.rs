pub mod config;
pub mod crypto;
pub mod error;
pub mod job_queue;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod sync_engine;
pub mod token_manager;
pub mod watch_manager;
pub mod worker;

/// Applies `migrations/001_init.sql` against a fresh pool, tracked the same
/// way `main` does against the production database. Exposed here so
/// integration tests stand up schema identically rather than re-deriving it.
pub async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS _migrations (version INT PRIMARY KEY, applied_at TIMESTAMPTZ DEFAULT now())",
    )
    .execute(pool)
    .await?;

    let migrations: &[(i32, &str)] = &[(1, include_str!("../migrations/001_init.sql"))];

    for &(version, sql) in migrations {
        let applied: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(pool)
            .await
            .unwrap_or(false);
        if !applied {
            sqlx::raw_sql(sql).execute(pool).await?;
            sqlx::query("INSERT INTO _migrations (version) VALUES ($1)")
                .bind(version)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}
