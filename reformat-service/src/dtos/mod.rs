use crate::services::{FormatJob, Template};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
    #[validate(required, length(min = 1))]
    pub data: Option<String>,
    #[validate(required, length(min = 1))]
    pub prompt: Option<String>,
    #[validate(required, length(min = 1))]
    pub model_name: Option<String>,
    #[validate(required, length(min = 1))]
    pub api_key: Option<String>,
}

impl FormatRequest {
    /// Convert a validated request into a job.
    pub fn into_job(self) -> Option<FormatJob> {
        Some(FormatJob {
            data: self.data?,
            prompt: self.prompt?,
            model: self.model_name?,
            api_key: self.api_key?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatResponse {
    pub converted_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub headers: Vec<String>,
    pub sample_row: String,
}

impl From<Template> for TemplateResponse {
    fn from(template: Template) -> Self {
        Self {
            headers: template.headers,
            sample_row: template.sample_row,
        }
    }
}
