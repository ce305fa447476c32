use crate::config::RefreshPolicy;
use crate::dtos::TemplateResponse;
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

pub async fn get_template(State(state): State<AppState>) -> impl IntoResponse {
    Json(TemplateResponse::from(state.templates.current().await))
}

/// Re-fetch the template. Only available with the on-demand refresh policy.
pub async fn refresh_template(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if state.templates.policy() != RefreshPolicy::OnDemand {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Template refresh is not enabled"
        )));
    }

    let template = state
        .templates
        .refresh()
        .await
        .map_err(|e| AppError::upstream("Error refreshing template", e))?;

    tracing::info!(columns = template.headers.len(), "Template refreshed on demand");
    Ok(Json(TemplateResponse::from(template)))
}
