//! services/shell/src/web/middleware.rs
//!
//! The route guard as middleware for protected endpoints.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use folklore_core::domain::Route;
use folklore_core::guard::{decide, GuardDecision};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

/// Gates a protected endpoint on the session controller's snapshot.
///
/// While the session is still resolving the request gets `204 No Content`
/// (render nothing). Anonymous visitors are sent to the public home with
/// `303 See Other`. Otherwise the `Identity` is inserted into the request
/// extensions for handlers to use.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let snapshot = state.session.snapshot();
    match decide(&snapshot, &Route::PublicHome) {
        GuardDecision::Pending => StatusCode::NO_CONTENT.into_response(),
        GuardDecision::Redirect(route) => {
            debug!("Redirecting anonymous request for {} to {}", req.uri().path(), route);
            (StatusCode::SEE_OTHER, [(header::LOCATION, route.path())]).into_response()
        }
        GuardDecision::Render => {
            if let Some(user) = snapshot.user() {
                req.extensions_mut().insert(user.clone());
            }
            next.run(req).await
        }
    }
}
