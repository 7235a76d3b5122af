//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use sleep_assistant_core::domain::User;
use sleep_assistant_core::ports::PortError;
use tracing::error;
use utoipa::{IntoParams, OpenApi};

use crate::export::{self, ExportFormat};
use crate::web::chat;
use crate::web::protocol::{ChatRequest, ChatResponse, ExportAttachment, StatisticsResponse};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat_message_handler,
        user_statistics_handler,
        user_export_handler,
    ),
    components(
        schemas(ChatRequest, ChatResponse, ExportAttachment, StatisticsResponse)
    ),
    tags(
        (name = "Sleep Assistant API", description = "API endpoints for the conversational sleep tracker.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Helpers
//=========================================================================================

fn error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unexpected(msg) => {
            error!(error = %msg, "request_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

async fn lookup_user(app: &AppState, chat_id: i64) -> Result<User, (StatusCode, String)> {
    app.users
        .get_by_chat_id(chat_id)
        .await
        .map_err(error_response)?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Unknown user {}", chat_id),
        ))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Process one chat turn.
///
/// The chat transport forwards each user message here and delivers the
/// localized replies (and optional export attachment) back to the user.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Turn processed", body = ChatResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn chat_message_handler(
    State(app): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    chat::handle_chat_message(&app, req)
        .await
        .map(Json)
        .map_err(error_response)
}

/// All-time sleep statistics for one user.
#[utoipa::path(
    get,
    path = "/users/{chat_id}/statistics",
    params(
        ("chat_id" = i64, Path, description = "Chat-platform user id")
    ),
    responses(
        (status = 200, description = "Aggregated statistics", body = StatisticsResponse),
        (status = 404, description = "Unknown user"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn user_statistics_handler(
    State(app): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = lookup_user(&app, chat_id).await?;

    let stats = app
        .stats
        .get_statistics(&user, None, None)
        .await
        .map_err(error_response)?;
    let first_session_date = app
        .stats
        .first_session_date(&user)
        .await
        .map_err(error_response)?;

    Ok(Json(StatisticsResponse {
        total_sessions: stats.total_sessions,
        avg_duration: stats.avg_duration,
        avg_quality: stats.avg_quality,
        total_sleep_hours: stats.total_sleep_hours,
        first_session_date: first_session_date.map(|d| d.format("%Y-%m-%d").to_string()),
    }))
}

#[derive(Deserialize, IntoParams)]
pub struct ExportParams {
    /// Export format: "csv" (default) or "json".
    pub format: Option<String>,
}

/// Download one user's completed sessions as a CSV or JSON file.
#[utoipa::path(
    get,
    path = "/users/{chat_id}/export",
    params(
        ("chat_id" = i64, Path, description = "Chat-platform user id"),
        ExportParams
    ),
    responses(
        (status = 200, description = "Export payload"),
        (status = 400, description = "Unknown export format"),
        (status = 404, description = "Unknown user"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn user_export_handler(
    State(app): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = lookup_user(&app, chat_id).await?;

    let format_name = params.format.as_deref().unwrap_or("csv");
    let Some(format) = ExportFormat::from_name(format_name) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Unknown export format '{}'", format_name),
        ));
    };

    let rows = app
        .stats
        .prepare_export_rows(&user, None, None)
        .await
        .map_err(error_response)?;
    let bytes = export::encode(format, &rows).map_err(|e| {
        error!(error = %e, "export_encoding_failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode export".to_string(),
        )
    })?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], bytes))
}
