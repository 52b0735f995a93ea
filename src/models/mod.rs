pub mod connection;
pub mod sync_job;

use serde::Serialize;

pub use connection::{CachedMessage, Connection, Folder};
pub use sync_job::{DistLock, SyncJob, WorkerRecord};

/// Thin response envelope used across every handler, matching this codebase's
/// existing `{ "data": ... }` wire shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
