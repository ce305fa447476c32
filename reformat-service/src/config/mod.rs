use service_core::config::{self as core_config, get_env, get_env_parsed, get_optional_env};
use service_core::error::AppError;
use service_core::genai::GEMINI_API_BASE;
use std::time::Duration;

const DEFAULT_REFRESH_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct ReformatConfig {
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub template: TemplateConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Endpoint serving the header/sample template. Without it the template
    /// stays empty.
    pub url: Option<String>,
    pub refresh: RefreshPolicy,
}

/// When the template is fetched again after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Never; the startup fetch is final.
    Static,
    /// In the background at a fixed interval.
    Periodic(Duration),
    /// Through `POST /refresh-template`.
    OnDemand,
}

impl RefreshPolicy {
    pub fn parse(value: &str, interval: Duration) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "static" => Ok(RefreshPolicy::Static),
            "periodic" => Ok(RefreshPolicy::Periodic(interval)),
            "on-demand" | "on_demand" | "ondemand" => Ok(RefreshPolicy::OnDemand),
            _ => Err(format!("Invalid template refresh policy: {}", value)),
        }
    }
}

impl ReformatConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_prod();

        let url = if is_prod {
            Some(get_env("REFORMAT_TEMPLATE_URL", None, is_prod)?)
        } else {
            get_optional_env("REFORMAT_TEMPLATE_URL")
        };

        let interval = Duration::from_secs(
            get_env_parsed("REFORMAT_TEMPLATE_REFRESH_SECS", DEFAULT_REFRESH_SECS, is_prod)?
                .max(1),
        );
        let refresh = RefreshPolicy::parse(
            &get_env("REFORMAT_TEMPLATE_REFRESH", Some("static"), is_prod)?,
            interval,
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Ok(ReformatConfig {
            common: common_config,
            gemini: GeminiSettings {
                api_base: get_env("GEMINI_API_BASE", Some(GEMINI_API_BASE), is_prod)?,
            },
            template: TemplateConfig { url, refresh },
        })
    }
}
