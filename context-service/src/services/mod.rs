pub mod context_cache;
pub mod storage;

pub use context_cache::{CacheSettings, ContextCache, ContextError, InvalidationOutcome};
pub use storage::{build_storage, LocalStorage, S3Storage, Storage};
