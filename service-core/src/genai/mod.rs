//! Generative-AI provider abstractions.
//!
//! The services talk to the provider through three narrow traits (file upload,
//! context caching, text generation) so handlers can be exercised against the
//! in-process [`mock::MockGenAi`] as well as the Gemini REST API.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use gemini::{GEMINI_API_BASE, GeminiClient, GeminiConfig};
pub use mock::{MockCall, MockGenAi};

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file stored with the provider's Files API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

/// Request to cache an uploaded file as model context.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCacheRequest {
    pub model: String,
    pub file: UploadedFile,
    pub ttl: Duration,
    pub display_name: Option<String>,
}

/// A provider-side cached content object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContent {
    /// Resource name, e.g. `cachedContents/abc123`. This is the cache handle.
    pub name: String,
    pub model: Option<String>,
    pub expire_time: Option<String>,
}

/// A single-turn generation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    /// Text parts of the user message, in order.
    pub parts: Vec<String>,
    /// Cached content to generate against.
    pub cached_content: Option<String>,
    /// Per-request credential overriding the configured one.
    pub api_key: Option<String>,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Other,
}

/// Result of a generation call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub finish_reason: FinishReason,
}

/// Trait for uploading local files to the provider.
#[async_trait]
pub trait FileProvider: Send + Sync {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, ProviderError>;
}

/// Trait for creating and deleting provider-side context caches.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn create_cache(
        &self,
        request: &CreateCacheRequest,
    ) -> Result<CachedContent, ProviderError>;

    async fn delete_cache(&self, name: &str) -> Result<(), ProviderError>;
}

/// Trait for text generation.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<ProviderResponse, ProviderError>;
}

/// Everything a context-caching service needs from one provider.
pub trait GenAiProvider: FileProvider + CacheProvider + TextProvider {}

impl<T: FileProvider + CacheProvider + TextProvider> GenAiProvider for T {}

/// Qualify a bare model id (`gemini-pro`) as a resource name (`models/gemini-pro`).
///
/// The id ends up in a URL path, so it must be a single segment of
/// alphanumerics, `-`, `_` and `.`.
pub fn model_resource(model: &str) -> Result<String, ProviderError> {
    let (collection, id) = match model.split_once('/') {
        Some((prefix @ ("models" | "tunedModels"), id)) => (prefix, id),
        Some(_) => {
            return Err(ProviderError::InvalidRequest(format!(
                "invalid model name: {}",
                model
            )));
        }
        None => ("models", model),
    };

    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid model name: {}",
            model
        )));
    }

    Ok(format!("{}/{}", collection, id))
}

/// Qualify a bare cache id as a `cachedContents/` resource name.
pub fn cache_resource(name: &str) -> String {
    if name.starts_with("cachedContents/") {
        name.to_string()
    } else {
        format!("cachedContents/{}", name)
    }
}
