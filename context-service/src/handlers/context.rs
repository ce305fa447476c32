use crate::dtos::{
    ContextStatusResponse, FindMatchRequest, FindMatchResponse, LoadContextResponse,
    MessageResponse,
};
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

pub async fn load_context(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let name = state
        .cache
        .load()
        .await
        .map_err(|e| e.into_app_error("Error loading and caching context mapping"))?;

    Ok(Json(LoadContextResponse {
        message: "Context loaded and cached successfully".to_string(),
        context_cache_name: name,
    }))
}

pub async fn delete_context(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state
        .cache
        .delete()
        .await
        .map_err(|e| e.into_app_error("Error deleting context cache"))?;

    Ok(Json(MessageResponse {
        message: "Context cache deleted successfully".to_string(),
    }))
}

/// Query the cached context. An unreadable body counts as missing fields.
pub async fn find_match(
    State(state): State<AppState>,
    payload: Option<Json<FindMatchRequest>>,
) -> Result<impl IntoResponse, AppError> {
    if !state.cache.is_loaded().await {
        return Err(AppError::ServiceUnavailable(
            "Context cache is not ready yet.".to_string(),
        ));
    }

    let (data, prompt) = payload
        .as_ref()
        .and_then(|Json(req)| Some((req.data_text()?, req.prompt_text()?.to_string())))
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing data or prompt.")))?;

    let closest_match = state
        .cache
        .find_match(&data, &prompt)
        .await
        .map_err(|e| e.into_app_error("Error finding match"))?;

    Ok(Json(FindMatchResponse { closest_match }))
}

pub async fn context_status(State(state): State<AppState>) -> impl IntoResponse {
    let name = state.cache.current().await;
    Json(ContextStatusResponse {
        loaded: name.is_some(),
        context_cache_name: name,
    })
}
