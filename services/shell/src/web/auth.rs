//! services/shell/src/web/auth.rs
//!
//! Authentication endpoints: sign-up, e-mail confirmation, login and logout.
//! They drive the session controller; results the user should see arrive as
//! toasts.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use folklore_core::session::AuthError;
use std::sync::Arc;
use tracing::error;

use crate::web::protocol::{AuthResponse, ConfirmQuery, LoginRequest, SignupRequest};
use crate::web::state::AppState;

fn auth_error_response(e: AuthError) -> (StatusCode, String) {
    let status = match &e {
        AuthError::PasswordMismatch | AuthError::RegistrationFailed(_) => StatusCode::BAD_REQUEST,
        AuthError::AlreadyRegistered => StatusCode::CONFLICT,
        AuthError::SignInFailed(_) => StatusCode::UNAUTHORIZED,
        AuthError::SignOutFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account pending e-mail confirmation
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created; confirmation pending", body = AuthResponse),
        (status = 202, description = "Account created without an identity echo"),
        (status = 400, description = "Passwords do not match, or the provider refused"),
        (status = 409, description = "E-mail already registered")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.session.register(&req.into()).await.map_err(auth_error_response)?;
    Ok(match user {
        Some(identity) => (StatusCode::CREATED, Json(AuthResponse::from(identity))).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

/// GET /auth/confirm - Confirm an e-mail address and sign in
#[utoipa::path(
    get,
    path = "/auth/confirm",
    params(ConfirmQuery),
    responses(
        (status = 200, description = "Account confirmed and signed in", body = AuthResponse),
        (status = 400, description = "Unknown or used token")
    )
)]
pub async fn confirm_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let session = state.confirmations.confirm_email(&query.token).await.map_err(|e| {
        error!("Failed to confirm account: {:?}", e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    Ok(Json(session.user.into()))
}

/// POST /auth/login - Sign in with e-mail and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Signed in; the session follows shortly"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .session
        .sign_in(&req.email, &req.password)
        .await
        .map_err(auth_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/logout - Sign out of the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 500, description = "The provider could not end the session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.session.sign_out().await.map_err(auth_error_response)?;
    state.assistant.close().await;
    state.direct.close().await;
    Ok(StatusCode::NO_CONTENT)
}
