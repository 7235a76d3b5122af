//! services/api/src/web/protocol.rs
//!
//! Wire payloads exchanged with the chat transport.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One inbound user turn, as forwarded by the chat transport.
///
/// The transport is trusted to have authenticated `chat_id`; this service
/// never sees credentials.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub chat_id: i64,
    pub text: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Language hint from the chat platform, applied on first contact.
    #[serde(default)]
    pub language_code: Option<String>,
}

/// The assistant's localized answer to one turn.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub replies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<ExportAttachment>,
}

impl ChatResponse {
    pub fn reply(text: String) -> Self {
        Self {
            replies: vec![text],
            attachment: None,
        }
    }

    pub fn replies(replies: Vec<String>) -> Self {
        Self {
            replies,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: ExportAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// An exported history file to be delivered as a document.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExportAttachment {
    pub filename: String,
    pub content_type: String,
    /// UTF-8 file body.
    pub content: String,
}

/// Summary metrics for one user, as returned by the REST endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsResponse {
    pub total_sessions: i64,
    pub avg_duration: f64,
    pub avg_quality: f64,
    pub total_sleep_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_session_date: Option<String>,
}
