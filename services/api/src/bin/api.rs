//! services/api/src/bin/api.rs

use std::sync::Arc;

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    localization::LocalizationService,
    web::{
        chat_message_handler, state::AppState, user_export_handler, user_statistics_handler,
        ApiDoc,
    },
};
use axum::{
    routing::{get, post},
    Router,
};
use sleep_assistant_core::{SleepTracker, StatisticsService, UserDirectory};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Load Translations & Build the Shared AppState ---
    let localization = Arc::new(LocalizationService::load(&config.translations_path));
    let app_state = Arc::new(AppState {
        users: UserDirectory::new(db_adapter.clone()),
        tracker: SleepTracker::new(db_adapter.clone()),
        stats: StatisticsService::new(db_adapter.clone()),
        dialogs: db_adapter,
        localization,
        config: config.clone(),
    });

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/messages", post(chat_message_handler))
        .route("/users/{chat_id}/statistics", get(user_statistics_handler))
        .route("/users/{chat_id}/export", get(user_export_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
