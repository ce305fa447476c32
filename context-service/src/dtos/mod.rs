use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct FindMatchRequest {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl FindMatchRequest {
    /// The input payload as text, or `None` when absent or empty.
    ///
    /// Strings are embedded verbatim; any other JSON value as compact JSON.
    pub fn data_text(&self) -> Option<String> {
        match self.data.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadContextResponse {
    pub message: String,
    pub context_cache_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchResponse {
    pub closest_match: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStatusResponse {
    pub loaded: bool,
    pub context_cache_name: Option<String>,
}
