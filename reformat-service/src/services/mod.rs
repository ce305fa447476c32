pub mod formatter;
pub mod template;

pub use formatter::{format_data, FormatJob};
pub use template::{Template, TemplateError, TemplateStore};
