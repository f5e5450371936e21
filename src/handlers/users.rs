//! User-context endpoints. The service is blocking, so every call is moved
//! onto the blocking pool.

use crate::context::{ConversationEntry, NewProfile};
use crate::error::{AppError, IngestResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

/// Conversations returned by a session open when `recent` is not given.
const DEFAULT_RECENT_CONVERSATIONS: usize = 5;

/// Query of `POST /users/{phone}/session`.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub recent: Option<usize>,
}

/// Body of `POST /users/{phone}/conversations`.
#[derive(Debug, Deserialize)]
pub struct NewConversation {
    pub user_input: String,
    pub assistant_response: String,
    pub session_id: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Defaults to the time the request is handled
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> IngestResult<T> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| AppError::Internal(format!("User context worker unavailable: {}", e)))?
        .map_err(AppError::from)
}

pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let phone_number = path.into_inner();
    let service = state.user_contexts.clone();
    let lookup = phone_number.clone();

    match run_blocking(move || service.get_user_context(&lookup)).await? {
        Some(context) => Ok(HttpResponse::Ok().json(context)),
        None => Err(AppError::NotFound(format!(
            "No user context for phone number {}",
            phone_number
        ))),
    }
}

/// Open a session for a caller: load their context, creating it under the
/// default name on first contact, and return it with the newest
/// conversations.
pub async fn open_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SessionQuery>,
) -> Result<HttpResponse, AppError> {
    let phone_number = path.into_inner();
    if phone_number.trim().is_empty() {
        return Err(AppError::ValidationError("phone_number cannot be empty".to_string()));
    }
    let limit = query.recent.unwrap_or(DEFAULT_RECENT_CONVERSATIONS);

    let service = state.user_contexts.clone();
    let context = run_blocking(move || service.get_or_create_user_context(&phone_number)).await?;
    let recent = context.recent_conversations(limit);

    Ok(HttpResponse::Ok().json(json!({
        "context": &context,
        "recent_conversations": recent,
    })))
}

pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<NewProfile>,
) -> Result<HttpResponse, AppError> {
    let new = body.into_inner();
    if new.phone_number.trim().is_empty() {
        return Err(AppError::ValidationError("phone_number cannot be empty".to_string()));
    }
    if new.name.trim().is_empty() {
        return Err(AppError::ValidationError("name cannot be empty".to_string()));
    }

    let service = state.user_contexts.clone();
    let profile = run_blocking(move || service.create_user_profile(new)).await?;
    Ok(HttpResponse::Created().json(profile))
}

pub async fn add_conversation(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NewConversation>,
) -> Result<HttpResponse, AppError> {
    let phone_number = path.into_inner();
    let body = body.into_inner();
    let entry = ConversationEntry {
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        user_input: body.user_input,
        assistant_response: body.assistant_response,
        session_id: body.session_id,
        confidence_score: body.confidence_score,
    };

    let service = state.user_contexts.clone();
    let context =
        run_blocking(move || service.update_conversation_history(&phone_number, entry)).await?;
    Ok(HttpResponse::Ok().json(context))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let phone_number = path.into_inner();
    let service = state.user_contexts.clone();
    let target = phone_number.clone();

    run_blocking(move || service.delete_user_context(&target)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "deleted",
        "phone_number": phone_number
    })))
}
