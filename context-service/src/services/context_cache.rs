//! Lifecycle of the provider-side context cache.
//!
//! [`ContextCache`] owns the single cache handle. Load and delete are
//! serialised by a lifecycle lock; queries read the handle without holding any
//! lock across the provider call and, on failure, clear it only if it has not
//! been replaced in the meantime.

use super::storage::Storage;
use metrics::counter;
use service_core::error::AppError;
use service_core::genai::{CreateCacheRequest, GenAiProvider, GenerateRequest, ProviderError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

const CONTEXT_MIME_TYPE: &str = "text/plain";

/// Fixed parameters of the cache lifecycle.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub model: String,
    pub ttl: Duration,
    pub object_key: String,
    pub scratch_dir: PathBuf,
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context cache is not loaded yet. Please load the context first.")]
    NotLoaded,

    #[error("No cached context to delete.")]
    NothingToDelete,

    #[error("Failed to fetch context object: {0}")]
    Storage(#[source] AppError),

    #[error("Failed to stage context file: {0}")]
    Scratch(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ContextError {
    /// Convert to an HTTP error; `message` is what callers see for upstream failures.
    pub fn into_app_error(self, message: &str) -> AppError {
        match self {
            ContextError::NotLoaded => {
                AppError::ServiceUnavailable("Context cache is not ready yet.".to_string())
            }
            ContextError::NothingToDelete => {
                AppError::BadRequest(anyhow::anyhow!("No cached context to delete."))
            }
            other => AppError::upstream(message, other),
        }
    }
}

/// Result of the best-effort cache invalidation after a failed query.
#[derive(Debug)]
pub enum InvalidationOutcome {
    /// The remote cache was deleted and the handle cleared.
    Deleted(String),
    /// No handle was set.
    NothingToDo,
    /// The handle had already been replaced by a newer load.
    Superseded,
    /// The remote delete failed; the handle was cleared locally anyway.
    RemoteFailed { handle: String, error: ProviderError },
}

pub struct ContextCache {
    handle: RwLock<Option<String>>,
    lifecycle: Mutex<()>,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn GenAiProvider>,
    settings: CacheSettings,
}

impl ContextCache {
    pub fn new(
        settings: CacheSettings,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn GenAiProvider>,
    ) -> Self {
        Self {
            handle: RwLock::new(None),
            lifecycle: Mutex::new(()),
            storage,
            provider,
            settings,
        }
    }

    /// Adopt a handle known from a previous run.
    pub fn with_initial_handle(mut self, handle: Option<String>) -> Self {
        self.handle = RwLock::new(handle.filter(|h| !h.is_empty()));
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub async fn current(&self) -> Option<String> {
        self.handle.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Fetch the context object, upload it, cache it and store the new handle.
    ///
    /// A failure at any step leaves the handle as it was.
    #[instrument(skip(self), fields(key = %self.settings.object_key))]
    pub async fn load(&self) -> Result<String, ContextError> {
        let _lifecycle = self.lifecycle.lock().await;

        let result = self.create_remote_cache().await;
        let outcome = if result.is_ok() { "success" } else { "error" };
        counter!("context_cache_loads_total", "outcome" => outcome).increment(1);
        let name = result?;

        let previous = self.handle.write().await.replace(name.clone());
        tracing::info!(handle = %name, "Context mapping cached successfully");

        if let Some(previous) = previous.filter(|p| *p != name) {
            match self.provider.delete_cache(&previous).await {
                Ok(()) => tracing::info!(handle = %previous, "Deleted superseded context cache"),
                Err(e) => tracing::warn!(
                    handle = %previous,
                    error = %e,
                    "Failed to delete superseded context cache"
                ),
            }
        }

        Ok(name)
    }

    async fn create_remote_cache(&self) -> Result<String, ContextError> {
        let contents = self
            .storage
            .download(&self.settings.object_key)
            .await
            .map_err(ContextError::Storage)?;
        tracing::debug!(bytes = contents.len(), "Fetched context object");

        let file = self.stage_and_upload(&contents).await?;
        tracing::debug!(uri = %file.uri, "Uploaded context file");

        let cached = self
            .provider
            .create_cache(&CreateCacheRequest {
                model: self.settings.model.clone(),
                file,
                ttl: self.settings.ttl,
                display_name: None,
            })
            .await?;

        Ok(cached.name)
    }

    /// Write `contents` to a scratch file and upload it. The scratch file is
    /// removed whether or not the upload succeeds.
    async fn stage_and_upload(
        &self,
        contents: &[u8],
    ) -> Result<service_core::genai::UploadedFile, ContextError> {
        tokio::fs::create_dir_all(&self.settings.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("context-")
            .suffix(".txt")
            .tempfile_in(&self.settings.scratch_dir)?;
        tokio::fs::write(scratch.path(), contents).await?;

        let uploaded = self
            .provider
            .upload_file(
                scratch.path(),
                CONTEXT_MIME_TYPE,
                &self.settings.display_name,
            )
            .await;

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "Failed to remove scratch file");
        }

        Ok(uploaded?)
    }

    /// Delete the remote cache and clear the handle.
    ///
    /// The handle is cleared even when the remote delete fails; the orphaned
    /// cache expires with its TTL and the next load resynchronises.
    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<String, ContextError> {
        let _lifecycle = self.lifecycle.lock().await;

        let handle = self.current().await.ok_or(ContextError::NothingToDelete)?;
        let result = self.provider.delete_cache(&handle).await;
        self.clear_if(&handle).await;

        match result {
            Ok(()) => {
                counter!("context_cache_deletes_total", "outcome" => "success").increment(1);
                tracing::info!(handle = %handle, "Context cache deleted");
                Ok(handle)
            }
            Err(e) => {
                counter!("context_cache_deletes_total", "outcome" => "error").increment(1);
                tracing::warn!(
                    handle = %handle,
                    error = %e,
                    "Remote cache delete failed; cleared handle locally"
                );
                Err(e.into())
            }
        }
    }

    /// Ask the model for the closest match to `data` within the cached context.
    ///
    /// Any failure invalidates the cache before the error is returned.
    #[instrument(skip(self, data, prompt), fields(data_len = data.len(), prompt_len = prompt.len()))]
    pub async fn find_match(&self, data: &str, prompt: &str) -> Result<String, ContextError> {
        let handle = self.current().await.ok_or(ContextError::NotLoaded)?;

        let request = GenerateRequest {
            model: self.settings.model.clone(),
            parts: vec![prompt.to_string(), match_instruction(data)],
            cached_content: Some(handle.clone()),
            api_key: None,
        };

        match self.provider.generate(&request).await {
            Ok(response) => {
                counter!("context_queries_total", "outcome" => "success").increment(1);
                tracing::debug!(
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Generated match"
                );
                Ok(response.text)
            }
            Err(e) => {
                counter!("context_queries_total", "outcome" => "error").increment(1);
                tracing::error!(handle = %handle, error = %e, "Query against cached context failed");
                let outcome = self.invalidate(&handle).await;
                tracing::warn!(?outcome, "Invalidated context cache after failed query");
                Err(e.into())
            }
        }
    }

    /// Best-effort invalidation of `handle`.
    ///
    /// Never fails: the outcome is returned for logging only.
    pub async fn invalidate(&self, handle: &str) -> InvalidationOutcome {
        match self.current().await.as_deref() {
            None => return InvalidationOutcome::NothingToDo,
            Some(current) if current != handle => return InvalidationOutcome::Superseded,
            Some(_) => {}
        }

        let result = self.provider.delete_cache(handle).await;
        if !self.clear_if(handle).await {
            return InvalidationOutcome::Superseded;
        }

        match result {
            Ok(()) => InvalidationOutcome::Deleted(handle.to_string()),
            Err(error) => InvalidationOutcome::RemoteFailed {
                handle: handle.to_string(),
                error,
            },
        }
    }

    /// Clear the handle if it still equals `expected`.
    async fn clear_if(&self, expected: &str) -> bool {
        let mut guard = self.handle.write().await;
        if guard.as_deref() == Some(expected) {
            *guard = None;
            true
        } else {
            false
        }
    }
}

/// Second message part of a match query.
pub fn match_instruction(data: &str) -> String {
    format!("Given the input data, find the closest match: {}", data)
}
