//! Gemini REST client.
//!
//! Implements file upload (resumable protocol), context caching and text
//! generation against `generativelanguage.googleapis.com`.

use super::{
    CacheProvider, CachedContent, CreateCacheRequest, FileProvider, FinishReason, GenerateRequest,
    ProviderError, ProviderResponse, TextProvider, UploadedFile, cache_resource, model_resource,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

const API_VERSION: &str = "v1beta";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Default credential. May be empty when every request carries its own.
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Build the REST URL for a resource path such as `cachedContents`.
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base(), API_VERSION, path)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/{}/files", self.base(), API_VERSION)
    }

    fn api_key<'a>(&'a self, request_key: Option<&'a str>) -> Result<&'a str, ProviderError> {
        let key = request_key.unwrap_or(self.config.api_key.as_str());
        if key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }
        Ok(key)
    }
}

/// Map non-success statuses to provider errors.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError {
        status: status.as_u16(),
        message,
    })
}

// reqwest errors carry the request URL, which holds the `key` query parameter.
fn network(e: reqwest::Error) -> ProviderError {
    ProviderError::NetworkError(e.without_url().to_string())
}

fn invalid(e: reqwest::Error) -> ProviderError {
    ProviderError::InvalidResponse(format!(
        "Failed to parse response: {}",
        e.without_url()
    ))
}

#[async_trait]
impl FileProvider for GeminiClient {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, ProviderError> {
        let key = self.api_key(None)?;
        let data = tokio::fs::read(path).await?;

        tracing::debug!(
            path = %path.display(),
            bytes = data.len(),
            mime_type,
            "Starting resumable upload to Gemini Files API"
        );

        let start = self
            .client
            .post(self.upload_url())
            .query(&[("key", key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: FileMetadata {
                    display_name: display_name.to_string(),
                },
            })
            .send()
            .await
            .map_err(network)?;
        let start = check_status(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("upload session URL missing".to_string())
            })?;

        let response = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .map_err(network)?;

        let uploaded: UploadFileResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(invalid)?;

        Ok(UploadedFile {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }
}

#[async_trait]
impl CacheProvider for GeminiClient {
    async fn create_cache(
        &self,
        request: &CreateCacheRequest,
    ) -> Result<CachedContent, ProviderError> {
        let key = self.api_key(None)?;

        let body = CreateCachedContentRequest {
            model: model_resource(&request.model)?,
            display_name: request.display_name.clone(),
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part::FileData {
                    file_data: FileData {
                        mime_type: request.file.mime_type.clone(),
                        file_uri: request.file.uri.clone(),
                    },
                }],
            }],
            ttl: format!("{}s", request.ttl.as_secs()),
        };

        let response = self
            .client
            .post(self.api_url("cachedContents"))
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(network)?;

        let cached: CachedContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(invalid)?;

        if cached.name.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "cached content has no name".to_string(),
            ));
        }

        Ok(CachedContent {
            name: cached.name,
            model: cached.model,
            expire_time: cached.expire_time,
        })
    }

    async fn delete_cache(&self, name: &str) -> Result<(), ProviderError> {
        let key = self.api_key(None)?;

        let response = self
            .client
            .delete(self.api_url(&cache_resource(name)))
            .query(&[("key", key)])
            .send()
            .await
            .map_err(network)?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TextProvider for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<ProviderResponse, ProviderError> {
        let key = self.api_key(request.api_key.as_deref())?;
        let model = model_resource(&request.model)?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: request
                    .parts
                    .iter()
                    .map(|text| Part::Text { text: text.clone() })
                    .collect(),
            }],
            cached_content: request.cached_content.clone(),
        };

        tracing::debug!(
            model = %model,
            parts = request.parts.len(),
            cached = request.cached_content.is_some(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url(&format!("{}:generateContent", model)))
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(network)?;

        let api_response: GenerateContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(invalid)?;

        if api_response
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some())
        {
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = api_response
            .candidates
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("no candidates".to_string()))?;

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("STOP") | None => FinishReason::Complete,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let text: String = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "response contained no text".to_string(),
            ));
        }

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StartUploadRequest {
    file: FileMetadata,
}

#[derive(Debug, Serialize)]
struct FileMetadata {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCachedContentRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    contents: Vec<Content>,
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    expire_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_content: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}
