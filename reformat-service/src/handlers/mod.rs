pub mod format;
pub mod health;
pub mod template;

pub use format::format_data;
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use template::{get_template, refresh_template};
