use crate::{config::AppConfig, error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config
    })))
}

/// Apply a partial JSON update.
///
/// Context settings reach the user-context service immediately. Server and
/// retry settings are stored but only take effect on the next start, since
/// the listener and the retrying store are built once in `main`.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config: AppConfig = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    state
        .user_contexts
        .update_settings(current_config.context.clone());

    info!(
        max_history_entries = current_config.context.max_history_entries,
        retry_max_attempts = current_config.retry.max_attempts,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "restart_required_for": ["server", "retry"],
        "updated_config": current_config
    })))
}
