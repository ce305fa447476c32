use crate::dtos::{FormatRequest, FormatResponse};
use crate::services;
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;
use service_core::genai::ProviderError;
use validator::Validate;

/// Reformat free text into CSV. An unreadable body counts as missing fields.
pub async fn format_data(
    State(state): State<AppState>,
    payload: Option<Json<FormatRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Missing data, prompt, modelName or apiKey."
        ))
    })?;
    request.validate()?;

    let job = request.into_job().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Missing data, prompt, modelName or apiKey."
        ))
    })?;

    let template = state.templates.current().await;
    if template.is_empty() {
        tracing::warn!("Formatting without a template; output will have no header line");
    }

    let converted_data = services::format_data(state.provider.as_ref(), &template, &job)
        .await
        .map_err(|e| match e {
            ProviderError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            other => AppError::upstream("Error converting data", other),
        })?;

    Ok(Json(FormatResponse { converted_data }))
}
