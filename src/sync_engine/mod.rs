pub mod backoff;
pub mod full_sync;
pub mod incremental_sync;

pub use incremental_sync::IncrementalSyncOutcome;
