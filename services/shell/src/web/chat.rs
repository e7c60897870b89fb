//! services/shell/src/web/chat.rs
//!
//! Endpoints of the two chat popups. `{channel}` is `assistant` or `direct`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use folklore_core::chat::{ChatSessionManager, ChatView, SendOutcome, ThreadMessage};
use folklore_core::domain::{ChatChannel, ChatSessionSummary, Identity};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::port_error_response;
use crate::web::protocol::SendMessageRequest;
use crate::web::state::AppState;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// The popup for `channel`, closed first if it still holds another user's state.
async fn popup(
    state: &AppState,
    user: &Identity,
    channel: &str,
) -> HandlerResult<Arc<ChatSessionManager>> {
    let manager = match channel.parse::<ChatChannel>() {
        Ok(ChatChannel::Assistant) => state.assistant.clone(),
        Ok(ChatChannel::Direct) => state.direct.clone(),
        Err(e) => return Err((StatusCode::NOT_FOUND, e.to_string())),
    };
    manager.bind_user(user.id).await;
    Ok(manager)
}

/// GET /chat/{channel}
pub async fn view_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(channel): Path<String>,
) -> HandlerResult<Json<ChatView>> {
    Ok(Json(popup(&state, &user, &channel).await?.view().await))
}

/// POST /chat/{channel}/open
pub async fn open_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(channel): Path<String>,
) -> HandlerResult<Json<ChatView>> {
    let manager = popup(&state, &user, &channel).await?;
    manager.open(user.id).await.map(Json).map_err(port_error_response)
}

/// POST /chat/{channel}/close
pub async fn close_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(channel): Path<String>,
) -> HandlerResult<StatusCode> {
    popup(&state, &user, &channel).await?.close().await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /chat/{channel}/sessions
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(channel): Path<String>,
) -> HandlerResult<(StatusCode, Json<ChatSessionSummary>)> {
    let session = popup(&state, &user, &channel)
        .await?
        .create_session()
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /chat/{channel}/sessions/{id}/select
pub async fn select_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path((channel, session_id)): Path<(String, Uuid)>,
) -> HandlerResult<Json<Vec<ThreadMessage>>> {
    popup(&state, &user, &channel)
        .await?
        .select_session(session_id)
        .await
        .map(Json)
        .map_err(port_error_response)
}

/// DELETE /chat/{channel}/sessions/{id}
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path((channel, session_id)): Path<(String, Uuid)>,
) -> HandlerResult<Json<ChatView>> {
    let manager = popup(&state, &user, &channel).await?;
    manager.delete_session(session_id).await.map_err(port_error_response)?;
    Ok(Json(manager.view().await))
}

/// GET /chat/{channel}/sessions/{id}/messages
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path((channel, session_id)): Path<(String, Uuid)>,
) -> HandlerResult<Json<Vec<ThreadMessage>>> {
    popup(&state, &user, &channel)
        .await?
        .load_messages(session_id)
        .await
        .map(Json)
        .map_err(port_error_response)
}

/// POST /chat/{channel}/messages
///
/// Rejected sends (blank text, a send already in flight, no open session)
/// answer `409 Conflict` with the reason.
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(channel): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> HandlerResult<(StatusCode, Json<SendOutcome>)> {
    let outcome = popup(&state, &user, &channel)
        .await?
        .send(&req.text)
        .await
        .map_err(port_error_response)?;
    let status = match outcome {
        SendOutcome::Replied(_) => StatusCode::OK,
        SendOutcome::Rejected(_) => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)))
}
