//! services/shell/src/web/rest.rs
//!
//! Assembles the HTTP router and holds the master definition for the OpenAPI
//! specification.

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::web::protocol::{AuthResponse, LoginRequest, SignupRequest};
use crate::web::state::AppState;
use crate::web::{auth, chat, middleware::require_session, shell, stories};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::confirm_handler,
        auth::login_handler,
        auth::logout_handler,
    ),
    components(
        schemas(SignupRequest, LoginRequest, AuthResponse)
    ),
    tags(
        (name = "Folklore Shell API", description = "Session, story and chat endpoints for the story-publishing app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds the application router. Everything outside the app chrome and the
/// auth endpoints sits behind the route guard.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/shell", get(shell::shell_handler))
        .route("/toasts", get(shell::toasts_handler))
        .route("/dialogs", get(shell::dialogs_handler).post(shell::dialog_action_handler))
        .route("/navigate", post(shell::navigate_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/confirm", get(auth::confirm_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let protected_routes = Router::new()
        .route("/profiles/{username}", get(stories::profile_handler))
        .route("/my-stories", get(stories::my_stories_handler))
        .route("/stories", post(stories::create_story_handler))
        .route(
            "/stories/{id}",
            get(stories::get_story_handler).patch(stories::update_story_handler),
        )
        .route(
            "/stories/{id}/chapters",
            get(stories::list_chapters_handler).post(stories::create_chapter_handler),
        )
        .route("/stories/{id}/chapters/reorder", post(stories::reorder_chapters_handler))
        .route("/stories/{id}/chapters/{chapter_id}", delete(stories::delete_chapter_handler))
        .route(
            "/chapters/{id}",
            get(stories::get_chapter_handler).put(stories::update_chapter_handler),
        )
        .route("/chat/{channel}", get(chat::view_handler))
        .route("/chat/{channel}/open", post(chat::open_handler))
        .route("/chat/{channel}/close", post(chat::close_handler))
        .route("/chat/{channel}/sessions", post(chat::create_session_handler))
        .route("/chat/{channel}/sessions/{id}", delete(chat::delete_session_handler))
        .route("/chat/{channel}/sessions/{id}/select", post(chat::select_session_handler))
        .route("/chat/{channel}/sessions/{id}/messages", get(chat::messages_handler))
        .route("/chat/{channel}/messages", post(chat::send_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::web::state::EmailConfirmation;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use folklore_core::domain::{AuthSession, ChatChannel, Identity, StoryStatus};
    use folklore_core::messages;
    use folklore_core::ports::{AuthChange, AuthEvent, PortError, PortResult};
    use folklore_core::testing::{FakeIdentity, InMemoryData, ScriptedInference};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct NoConfirmations;

    #[async_trait]
    impl EmailConfirmation for NoConfirmations {
        async fn confirm_email(&self, _token: &str) -> PortResult<AuthSession> {
            Err(PortError::Rejected("Unknown confirmation token".to_string()))
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "postgres://unused".to_string(),
            log_level: tracing::Level::INFO,
            openai_api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            site_url: "http://localhost:5173".to_string(),
            session_ttl: chrono::Duration::days(30),
            token_refresh_interval: std::time::Duration::from_secs(3000),
        })
    }

    struct Harness {
        state: Arc<AppState>,
        identity: Arc<FakeIdentity>,
        data: Arc<InMemoryData>,
    }

    fn harness() -> Harness {
        let identity = Arc::new(FakeIdentity::default());
        let data = Arc::new(InMemoryData::default());
        let state = Arc::new(AppState::new(
            test_config(),
            identity.clone(),
            Arc::new(NoConfirmations),
            data.clone(),
            Arc::new(ScriptedInference::replying("Érase una vez...")),
        ));
        Harness { state, identity, data }
    }

    async fn sign_in(h: &Harness) -> Identity {
        let user = h.identity.add_account("ana@example.com", "secreto", "ana");
        h.data.add_profile(user.id, "ana");
        let session = h.identity.force_sign_in(&user);
        h.state
            .session
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session) })
            .await;
        user
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn protected_routes_render_nothing_while_the_session_resolves() {
        let h = harness();
        let response = router(h.state.clone())
            .oneshot(Request::get("/my-stories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn anonymous_visitors_are_sent_to_the_public_home() {
        let h = harness();
        h.state.session.initialize().await;

        let response = router(h.state.clone())
            .oneshot(Request::get("/my-stories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/home/public");
    }

    #[tokio::test]
    async fn signed_in_users_see_their_stories() {
        let h = harness();
        let user = sign_in(&h).await;
        h.data.add_story(user.id, "La Llorona", StoryStatus::Published);
        h.data.add_story(user.id, "El Cadejo", StoryStatus::Draft);

        let response = router(h.state.clone())
            .oneshot(Request::get("/my-stories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["published"].as_array().unwrap().len(), 1);
        assert_eq!(body["drafts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stories_of_other_authors_are_forbidden() {
        let h = harness();
        sign_in(&h).await;
        let story = h.data.add_story(uuid::Uuid::new_v4(), "Ajena", StoryStatus::Draft);

        let response = router(h.state.clone())
            .oneshot(
                Request::get(format!("/stories/{}", story.id)).body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn mismatched_passwords_are_refused_with_a_toast() {
        let h = harness();
        let body = r#"{"email":"ana@example.com","username":"ana","password":"secreto","confirm_password":"secretO"}"#;

        let response = router(h.state.clone())
            .oneshot(json_request("POST", "/auth/signup", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.identity.sign_up_calls(), 0);

        let toasts = h.state.toasts.drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, messages::PASSWORDS_DO_NOT_MATCH);
    }

    #[tokio::test]
    async fn blank_chat_messages_are_rejected() {
        let h = harness();
        sign_in(&h).await;
        let app = router(h.state.clone());

        let opened = app
            .clone()
            .oneshot(json_request("POST", "/chat/assistant/open", ""))
            .await
            .unwrap();
        assert_eq!(opened.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request("POST", "/chat/assistant/messages", r#"{"text":"   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "rejected");
        assert_eq!(body["message"], "empty_text");
    }

    #[tokio::test]
    async fn a_new_user_never_writes_into_the_previous_users_chat() {
        let h = harness();
        let ana = sign_in(&h).await;
        let app = router(h.state.clone());
        let opened = app
            .clone()
            .oneshot(json_request("POST", "/chat/assistant/open", ""))
            .await
            .unwrap();
        let ana_session = body_json(opened).await["active_session"].as_str().unwrap().to_string();

        let beto = h.identity.add_account("beto@example.com", "secreto", "beto");
        let session = h.identity.force_sign_in(&beto);
        h.state
            .session
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session) })
            .await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/chat/assistant/messages", r#"{"text":"soy beto"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "no_active_session");

        let ana_session = uuid::Uuid::parse_str(&ana_session).unwrap();
        assert!(h.data.chat_messages(ana_session).is_empty());
        let view = app
            .oneshot(Request::get("/chat/assistant").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(view).await["state"], "closed");
        assert_eq!(h.data.chat_sessions(ana.id, ChatChannel::Assistant).len(), 1);
    }

    #[tokio::test]
    async fn chat_threads_outside_the_popup_are_not_served() {
        let h = harness();
        sign_in(&h).await;
        let stranger = h.data.add_chat_session(
            uuid::Uuid::new_v4(),
            ChatChannel::Assistant,
            "ajena",
        );
        let app = router(h.state.clone());
        app.clone()
            .oneshot(json_request("POST", "/chat/assistant/open", ""))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::get(format!("/chat/assistant/sessions/{}/messages", stranger))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_chat_channels_are_not_found() {
        let h = harness();
        sign_in(&h).await;

        let response = router(h.state.clone())
            .oneshot(Request::get("/chat/telegram").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn navigation_to_protected_pages_falls_back_for_anonymous_visitors() {
        let h = harness();
        h.state.session.initialize().await;

        let response = router(h.state.clone())
            .oneshot(json_request("POST", "/navigate", r#"{"path":"/story/new"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["route"], "/home/public");
    }
}
