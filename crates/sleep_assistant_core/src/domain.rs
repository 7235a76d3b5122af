//! crates/sleep_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveTime, Utc};
use uuid::Uuid;

/// Languages the assistant can speak. Unknown codes resolve to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    En,
    Ru,
    Et,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ru, Language::Et];

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::En),
            "ru" => Some(Language::Ru),
            "et" => Some(Language::Et),
            _ => None,
        }
    }

    /// Resolve a chat-platform language hint, falling back to the default.
    pub fn from_code_or_default(code: Option<&str>) -> Self {
        code.and_then(Language::from_code).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Et => "et",
        }
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// Stable external identity assigned by the chat platform.
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Language,
    /// IANA timezone name (e.g. "Europe/Tallinn").
    pub timezone: String,
    pub is_onboarded: bool,
    pub target_bedtime: Option<NaiveTime>,
    pub target_wake_time: Option<NaiveTime>,
    pub target_sleep_hours: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_sleep_goals(&self) -> bool {
        self.target_sleep_hours.is_some()
    }
}

/// A single sleep tracking record.
///
/// `sleep_end == None` means the session is still active; setting it is a
/// one-way transition that also fixes `duration_hours`.
#[derive(Debug, Clone)]
pub struct SleepSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sleep_start: DateTime<Utc>,
    pub sleep_end: Option<DateTime<Utc>>,
    /// Derived from `sleep_start`/`sleep_end` on completion; never supplied
    /// by a caller.
    pub duration_hours: Option<f64>,
    pub quality_rating: Option<f64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SleepSession {
    pub fn is_active(&self) -> bool {
        self.sleep_end.is_none()
    }
}

/// Profile details supplied by the chat platform on first contact.
#[derive(Debug, Clone, Default)]
pub struct NewUserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Language,
    pub timezone: String,
}

/// Sleep goals captured during onboarding.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepGoals {
    pub target_bedtime: Option<NaiveTime>,
    pub target_wake_time: Option<NaiveTime>,
    pub target_sleep_hours: Option<i32>,
}

/// Aggregated metrics over a set of completed sessions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SleepStatistics {
    pub total_sessions: i64,
    pub avg_duration: f64,
    /// Average over rated sessions only; zero when none carry a rating.
    pub avg_quality: f64,
    pub total_sleep_hours: f64,
}

/// One completed session prepared for export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub date: String,
    pub sleep_start: String,
    pub sleep_end: String,
    pub duration_hours: f64,
    pub quality_rating: Option<f64>,
    pub note: Option<String>,
}

/// Which optional field of a completed session an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateField {
    Quality,
    Note,
}

impl UpdateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateField::Quality => "quality",
            UpdateField::Note => "note",
        }
    }
}

/// Outcome of the late-update staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateValidation {
    /// Apply immediately, no confirmation required.
    Allow,
    /// A value already exists; show existing vs proposed and confirm.
    AskConfirmation,
    /// The session ended too long ago; warn and confirm before applying.
    ShowWarning,
}

/// The caller's explicit choice when starting sleep while another session
/// is still active. Never inferred automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// End the active session now, then start a new one.
    SaveAndStart,
    /// Keep using the existing active session.
    Continue,
    /// Discard the active session without a completed record, then start.
    CancelAndStart,
}
