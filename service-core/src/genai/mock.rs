//! In-process provider used by tests and local development.
//!
//! Records every call and lets each operation be switched to fail.

use super::{
    CacheProvider, CachedContent, CreateCacheRequest, FileProvider, FinishReason, GenerateRequest,
    ProviderError, ProviderResponse, TextProvider, UploadedFile,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A call observed by [`MockGenAi`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Upload {
        path: PathBuf,
        contents: Vec<u8>,
        mime_type: String,
        display_name: String,
    },
    CreateCache(CreateCacheRequest),
    DeleteCache(String),
    Generate(GenerateRequest),
}

pub struct MockGenAi {
    file_uri: String,
    cache_name: Mutex<String>,
    reply: Mutex<String>,
    fail_upload: AtomicBool,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    fail_generate: AtomicBool,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockGenAi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenAi {
    pub fn new() -> Self {
        Self {
            file_uri: "https://generativelanguage.googleapis.com/v1beta/files/mock".to_string(),
            cache_name: Mutex::new("cachedContents/mock".to_string()),
            reply: Mutex::new("Mock response".to_string()),
            fail_upload: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_generate: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file_uri(mut self, uri: impl Into<String>) -> Self {
        self.file_uri = uri.into();
        self
    }

    pub fn with_cache_name(self, name: impl Into<String>) -> Self {
        self.set_cache_name(name);
        self
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        *lock(&self.reply) = reply.into();
        self
    }

    /// Name returned by the next `create_cache`.
    pub fn set_cache_name(&self, name: impl Into<String>) {
        *lock(&self.cache_name) = name.into();
    }

    pub fn fail_upload(&self, fail: bool) {
        self.fail_upload.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn generate_calls(&self) -> Vec<GenerateRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Generate(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::DeleteCache(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    fn failure(flag: &AtomicBool, what: &str) -> Result<(), ProviderError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError {
                status: 500,
                message: format!("mock {} failure", what),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl FileProvider for MockGenAi {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, ProviderError> {
        let contents = tokio::fs::read(path).await?;
        self.record(MockCall::Upload {
            path: path.to_path_buf(),
            contents,
            mime_type: mime_type.to_string(),
            display_name: display_name.to_string(),
        });
        Self::failure(&self.fail_upload, "upload")?;

        Ok(UploadedFile {
            name: "files/mock".to_string(),
            uri: self.file_uri.clone(),
            mime_type: mime_type.to_string(),
        })
    }
}

#[async_trait]
impl CacheProvider for MockGenAi {
    async fn create_cache(
        &self,
        request: &CreateCacheRequest,
    ) -> Result<CachedContent, ProviderError> {
        self.record(MockCall::CreateCache(request.clone()));
        Self::failure(&self.fail_create, "create cache")?;

        Ok(CachedContent {
            name: lock(&self.cache_name).clone(),
            model: Some(request.model.clone()),
            expire_time: None,
        })
    }

    async fn delete_cache(&self, name: &str) -> Result<(), ProviderError> {
        self.record(MockCall::DeleteCache(name.to_string()));
        Self::failure(&self.fail_delete, "delete cache")
    }
}

#[async_trait]
impl TextProvider for MockGenAi {
    async fn generate(&self, request: &GenerateRequest) -> Result<ProviderResponse, ProviderError> {
        self.record(MockCall::Generate(request.clone()));
        Self::failure(&self.fail_generate, "generate")?;

        let input_tokens = request.parts.iter().map(|p| p.len() as i32 / 4).sum();
        Ok(ProviderResponse {
            text: lock(&self.reply).clone(),
            input_tokens,
            output_tokens: 10,
            finish_reason: FinishReason::Complete,
        })
    }
}
