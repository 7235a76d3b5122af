//! crates/sleep_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Language, NewUserProfile, SleepGoals, SleepSession, SleepStatistics, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// `NotFound`, `Conflict` and `Validation` are normal business outcomes the
/// caller is expected to handle; `Unexpected` wraps storage and other
/// infrastructure failures, which abort the current unit of work.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicts with existing state: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch the user for this chat identity, creating them on first
    /// contact. The boolean is true when a new row was created.
    async fn get_or_create(&self, chat_id: i64, profile: &NewUserProfile)
        -> PortResult<(User, bool)>;

    async fn get_by_chat_id(&self, chat_id: i64) -> PortResult<Option<User>>;

    async fn update_language(&self, user_id: Uuid, language: Language) -> PortResult<User>;

    async fn update_timezone(&self, user_id: Uuid, timezone: &str) -> PortResult<User>;

    /// Store sleep goals and mark the user as onboarded.
    async fn complete_onboarding(&self, user_id: Uuid, goals: &SleepGoals) -> PortResult<User>;

    async fn update_sleep_goals(&self, user_id: Uuid, goals: &SleepGoals) -> PortResult<User>;
}

#[async_trait]
pub trait SleepSessionStore: Send + Sync {
    /// The most recently started session without an end time. There should
    /// be at most one, but the query must be defensive about duplicates.
    async fn get_active(&self, user_id: Uuid) -> PortResult<Option<SleepSession>>;

    /// The completed session with the latest `sleep_end`.
    async fn get_last_completed(&self, user_id: Uuid) -> PortResult<Option<SleepSession>>;

    async fn create(&self, user_id: Uuid, sleep_start: DateTime<Utc>)
        -> PortResult<SleepSession>;

    /// Set `sleep_end` and the derived duration. The duration is computed
    /// by the caller from the session's own timestamps.
    async fn complete(
        &self,
        session_id: Uuid,
        sleep_end: DateTime<Utc>,
        duration_hours: f64,
    ) -> PortResult<SleepSession>;

    async fn set_quality_rating(&self, session_id: Uuid, rating: f64)
        -> PortResult<SleepSession>;

    async fn set_note(&self, session_id: Uuid, note: &str) -> PortResult<SleepSession>;

    /// Remove a session outright. Used only for cancellation.
    async fn delete(&self, session_id: Uuid) -> PortResult<()>;

    /// Sessions whose `sleep_start` falls within `[start, end]`, ascending
    /// by `sleep_start`.
    async fn list_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        completed_only: bool,
    ) -> PortResult<Vec<SleepSession>>;

    /// All sessions for the user, descending by `sleep_start`.
    async fn list_all(&self, user_id: Uuid, completed_only: bool)
        -> PortResult<Vec<SleepSession>>;

    /// Start time of the user's earliest session, if any.
    async fn first_session_start(&self, user_id: Uuid) -> PortResult<Option<DateTime<Utc>>>;

    /// Aggregate metrics over completed sessions, optionally bounded by
    /// `sleep_start`. Returns an all-zero result when nothing matches;
    /// quality averages ignore unrated sessions.
    async fn aggregate(
        &self,
        user_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PortResult<SleepStatistics>;
}

/// Persistence for the per-user dialogue position between turns.
///
/// The value is an opaque serialized state owned by the front end; the core
/// only guarantees one slot per user.
#[async_trait]
pub trait DialogStateStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> PortResult<Option<String>>;

    async fn save(&self, user_id: Uuid, state: &str) -> PortResult<()>;

    async fn clear(&self, user_id: Uuid) -> PortResult<()>;
}
