pub mod connections;
pub mod folders;
pub mod locks;
pub mod messages;
pub mod workers;

use sqlx::PgPool;

/// Thin handle over the connection pool. Every query in this module filters by
/// `user_id` explicitly — the pool credential is privileged, so tenant
/// isolation is this layer's job, not the database's.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
