//! HTTP request handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::agent_config::image_enabled_agent_config;
use crate::auth::CurrentUser;
use crate::bridge::{EventOutcome, GeneratedImage, SessionSnapshot};
use crate::trigger::{ConversationEvent, TriggerRequest};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub generator_configured: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.bridge.registry().len(),
        generator_configured: state.generator_configured,
    })
}

// ============================================================================
// Voice platform webhook
// ============================================================================

/// POST /webhooks/conversation-event
#[instrument(skip(state, headers, event), fields(event_type = %event.event_type))]
pub async fn conversation_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ConversationEvent>,
) -> ApiResult<Json<EventOutcome>> {
    if let Some(expected) = state.webhook_token.as_deref() {
        let presented = headers
            .get(WEBHOOK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return Err(ApiError::unauthorized("invalid webhook token"));
        }
    }

    let outcome = state.bridge.process_event(&event);
    debug!(?outcome, "conversation event processed");
    Ok(Json(outcome))
}

// ============================================================================
// Conversations
// ============================================================================

/// Ensure the caller may act on a live session.
fn authorize(state: &AppState, user: &CurrentUser, conversation_id: &str) -> ApiResult<()> {
    let owner = state
        .bridge
        .owner_of(conversation_id)
        .ok_or_else(|| ApiError::not_found(format!("conversation {}", conversation_id)))?;
    if owner != user.id() && !user.is_admin() {
        return Err(ApiError::forbidden(
            "conversation belongs to another user",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

/// POST /conversations/{id}/images
///
/// Generates one image, waits for it and returns it. The bound display gets
/// the usual push events as well.
#[instrument(skip(state, user, request), fields(user = %user.id()))]
pub async fn generate_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
    Json(request): Json<GenerateImageRequest>,
) -> ApiResult<(StatusCode, Json<GeneratedImage>)> {
    authorize(&state, &user, &conversation_id)?;

    let trigger = TriggerRequest::from_parts(
        &request.prompt,
        request.style.as_deref(),
        request.aspect_ratio.as_deref(),
    );
    if trigger.prompt.is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let ticket = state
        .bridge
        .generate(&conversation_id, trigger)
        .ok_or_else(|| ApiError::not_found(format!("conversation {}", conversation_id)))?;
    let image = ticket.wait().await?;

    info!(url = %image.url, "manual image generated");
    Ok((StatusCode::CREATED, Json(image)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageListResponse {
    pub conversation_id: String,
    pub images: Vec<GeneratedImage>,
    pub credits_used: u32,
}

impl ImageListResponse {
    fn new(conversation_id: String, images: Vec<GeneratedImage>) -> Self {
        let credits_used = images.iter().map(|i| i.credits_used).sum();
        Self {
            conversation_id,
            images,
            credits_used,
        }
    }
}

/// GET /conversations/{id}/images
pub async fn list_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ImageListResponse>> {
    authorize(&state, &user, &conversation_id)?;
    let images = state.bridge.list_images(&conversation_id);
    Ok(Json(ImageListResponse::new(conversation_id, images)))
}

/// DELETE /conversations/{id}
pub async fn end_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ImageListResponse>> {
    authorize(&state, &user, &conversation_id)?;
    let images = state.bridge.end(&conversation_id);
    info!(conversation = %conversation_id, images = images.len(), "conversation ended via API");
    Ok(Json(ImageListResponse::new(conversation_id, images)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListConversationsQuery {
    /// Admins only: list every active session.
    #[serde(default)]
    pub all: bool,
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<Vec<SessionSnapshot>>> {
    if query.all {
        if !user.is_admin() {
            return Err(ApiError::forbidden("admin role required"));
        }
        return Ok(Json(state.bridge.all_sessions()));
    }
    Ok(Json(state.bridge.sessions_for_owner(user.id())))
}

// ============================================================================
// Voice agent configuration
// ============================================================================

/// POST /agent/config
pub async fn agent_config(
    _user: CurrentUser,
    Json(base): Json<Value>,
) -> ApiResult<Json<Value>> {
    image_enabled_agent_config(base)
        .map(Json)
        .map_err(|e| ApiError::bad_request(e.to_string()))
}
