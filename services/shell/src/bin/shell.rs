//! services/shell/src/bin/shell.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use folklore_core::ports::InferenceService;
use shell_lib::{
    adapters::{OpenAiInferenceAdapter, PgDataService, PgIdentityProvider, UnconfiguredInference},
    config::Config,
    error::ShellError,
    web::{router, ApiDoc, AppState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ShellError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting shell...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let data = Arc::new(PgDataService::new(db_pool.clone()));
    info!("Running database migrations...");
    data.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let identity = Arc::new(PgIdentityProvider::new(db_pool, config.session_ttl));
    if let Some(session) = identity.restore().await? {
        info!("Restored the session of {}", session.user.email);
    }

    let inference: Arc<dyn InferenceService> = match &config.openai_api_key {
        Some(key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            Arc::new(OpenAiInferenceAdapter::new(client, config.chat_model.clone()))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; the assistant will only apologise.");
            Arc::new(UnconfiguredInference)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        identity.clone(),
        identity.clone(),
        data,
        inference,
    ));

    // --- 5. Start Background Tasks ---
    let cancel = CancellationToken::new();
    let session = app_state.session.clone();
    let session_cancel = cancel.clone();
    tokio::spawn(async move { session.run(session_cancel).await });

    let chats_state = app_state.clone();
    let chats_cancel = cancel.clone();
    tokio::spawn(async move { chats_state.close_chats_on_user_change(chats_cancel).await });

    let refresh_identity = identity.clone();
    let refresh_cancel = cancel.clone();
    let refresh_every = config.token_refresh_interval;
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(refresh_every);
        // The first tick completes immediately.
        ticks.tick().await;
        loop {
            tokio::select! {
                _ = refresh_cancel.cancelled() => break,
                _ = ticks.tick() => {
                    if let Err(e) = refresh_identity.refresh_session().await {
                        warn!("Token refresh failed: {}", e);
                    }
                }
            }
        }
    });

    // --- 6. Create the Web Router ---
    let origin = config.site_url.parse::<HeaderValue>().map_err(|e| {
        ShellError::Internal(format!("SITE_URL is not a valid origin: {}", e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown: {}", e);
            }
            info!("Shutting down...");
            cancel.cancel();
        })
        .await?;

    Ok(())
}
