use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, get_optional_env};
use service_core::error::AppError;
use service_core::genai::GEMINI_API_BASE;

/// Model the context cache is created for. Queries must use the same model.
const DEFAULT_CACHE_MODEL: &str = "models/gemini-1.5-flash-001";

/// Cache lifetime on the provider side (1 hour).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub google: GoogleConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Key of the context object inside the bucket (or below `local_path`).
    pub object_key: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub model: String,
    pub ttl_seconds: u64,
    /// Directory for the staged upload file.
    pub scratch_dir: String,
    pub display_name: String,
    /// Handle to adopt at startup, e.g. a cache created by a previous run.
    pub initial_name: Option<String>,
}

impl ContextConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_prod();

        let backend: StorageBackend = get_env("STORAGE_BACKEND", Some("local"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let s3_bucket = get_optional_env("S3_BUCKET_NAME");
        if backend == StorageBackend::S3 && s3_bucket.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "S3_BUCKET_NAME is required when STORAGE_BACKEND=s3"
            )));
        }

        let default_scratch = std::env::temp_dir().to_string_lossy().into_owned();

        Ok(ContextConfig {
            common: common_config,
            google: GoogleConfig {
                api_key: get_env("GOOGLE_API_KEY", None, is_prod)?,
                api_base: get_env("GEMINI_API_BASE", Some(GEMINI_API_BASE), is_prod)?,
            },
            storage: StorageConfig {
                backend,
                local_path: get_env("STORAGE_LOCAL_PATH", Some("storage"), is_prod)?,
                s3_bucket,
                s3_region: get_optional_env("AWS_REGION"),
                object_key: get_env("S3_KEY_NAME", Some("context.txt"), is_prod)?,
            },
            cache: CacheConfig {
                model: get_env("CONTEXT_CACHE_MODEL", Some(DEFAULT_CACHE_MODEL), is_prod)?,
                ttl_seconds: get_env_parsed(
                    "CONTEXT_CACHE_TTL_SECONDS",
                    DEFAULT_CACHE_TTL_SECONDS,
                    is_prod,
                )?,
                scratch_dir: get_env("CONTEXT_SCRATCH_DIR", Some(&default_scratch), is_prod)?,
                display_name: get_env(
                    "CONTEXT_FILE_DISPLAY_NAME",
                    Some("Large Context File"),
                    is_prod,
                )?,
                initial_name: get_optional_env("CONTEXT_CACHE_INITIAL_NAME"),
            },
        })
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}
