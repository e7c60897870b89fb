//! services/shell/src/web/shell.rs
//!
//! App chrome endpoints: the shell view, toasts, auth dialogs and navigation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use folklore_core::domain::{Route, Toast};
use folklore_core::guard::{decide, GuardDecision};
use folklore_core::ports::Navigator;
use std::sync::Arc;

use crate::web::protocol::{
    DialogAction, DialogRequest, DialogsView, NavigateRequest, NavigateResponse, ShellView,
};
use crate::web::state::AppState;

/// GET /shell
pub async fn shell_handler(State(state): State<Arc<AppState>>) -> Json<ShellView> {
    let snapshot = state.session.snapshot();
    Json(ShellView {
        route: state.navigator.current().path(),
        loading: snapshot.loading,
        user: snapshot.user().cloned(),
        profile: snapshot.profile,
        dialogs: state.session.dialogs().into(),
    })
}

/// GET /toasts - Toasts raised since the last poll
pub async fn toasts_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Toast>> {
    Json(state.toasts.drain())
}

/// GET /dialogs
pub async fn dialogs_handler(State(state): State<Arc<AppState>>) -> Json<DialogsView> {
    Json(state.session.dialogs().into())
}

/// POST /dialogs
pub async fn dialog_action_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DialogRequest>,
) -> Json<DialogsView> {
    let session = &state.session;
    match req.action {
        DialogAction::OpenLogin => session.open_login(),
        DialogAction::CloseLogin => session.close_login(),
        DialogAction::OpenRegister => session.open_register(),
        DialogAction::CloseRegister => session.close_register(),
        DialogAction::SwitchToRegister => session.switch_to_register(),
        DialogAction::SwitchToLogin => session.switch_to_login(),
    }
    Json(session.dialogs().into())
}

/// POST /navigate - Client-side navigation, guarded like any protected page.
pub async fn navigate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NavigateRequest>,
) -> Result<Response, (StatusCode, String)> {
    let route = Route::parse(&req.path)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No page at {}", req.path)))?;

    let target = if route.is_protected() {
        match decide(&state.session.snapshot(), &Route::PublicHome) {
            GuardDecision::Pending => return Ok(StatusCode::NO_CONTENT.into_response()),
            GuardDecision::Redirect(fallback) => fallback,
            GuardDecision::Render => route,
        }
    } else {
        route
    };

    state.navigator.navigate(target.clone());
    Ok(Json(NavigateResponse { route: target.path() }).into_response())
}
