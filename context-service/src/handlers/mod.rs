pub mod context;
pub mod health;

pub use context::{context_status, delete_context, find_match, load_context};
pub use health::{health_check, metrics_endpoint, readiness_check};
