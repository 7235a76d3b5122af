//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sleep_assistant_core::domain::{
    Language, NewUserProfile, SleepGoals, SleepSession, SleepStatistics, User,
};
use sleep_assistant_core::ports::{
    DialogStateStore, PortError, PortResult, SleepSessionStore, UserStore,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Column list for users queries.
const USER_COLUMNS: &str = "id, chat_id, username, first_name, last_name, language_code, \
    timezone, is_onboarded, target_bedtime, target_wake_time, target_sleep_hours, created_at";

/// Column list for sleep_sessions queries.
const SESSION_COLUMNS: &str = "id, user_id, sleep_start, sleep_end, duration_hours, \
    quality_rating, note, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the core's store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    chat_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    language_code: String,
    timezone: String,
    is_onboarded: bool,
    target_bedtime: Option<NaiveTime>,
    target_wake_time: Option<NaiveTime>,
    target_sleep_hours: Option<i32>,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            chat_id: self.chat_id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            language: Language::from_code_or_default(Some(&self.language_code)),
            timezone: self.timezone,
            is_onboarded: self.is_onboarded,
            target_bedtime: self.target_bedtime,
            target_wake_time: self.target_wake_time,
            target_sleep_hours: self.target_sleep_hours,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    sleep_start: DateTime<Utc>,
    sleep_end: Option<DateTime<Utc>>,
    duration_hours: Option<f64>,
    quality_rating: Option<f64>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl SessionRecord {
    fn to_domain(self) -> SleepSession {
        SleepSession {
            id: self.id,
            user_id: self.user_id,
            sleep_start: self.sleep_start,
            sleep_end: self.sleep_end,
            duration_hours: self.duration_hours,
            quality_rating: self.quality_rating,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StatsRecord {
    total_sessions: i64,
    avg_duration: f64,
    avg_quality: f64,
    total_sleep_hours: f64,
}

impl StatsRecord {
    fn to_domain(self) -> SleepStatistics {
        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        SleepStatistics {
            total_sessions: self.total_sessions,
            avg_duration: round2(self.avg_duration),
            avg_quality: round2(self.avg_quality),
            total_sleep_hours: round2(self.total_sleep_hours),
        }
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn get_or_create(
        &self,
        chat_id: i64,
        profile: &NewUserProfile,
    ) -> PortResult<(User, bool)> {
        let insert = format!(
            "INSERT INTO users (id, chat_id, username, first_name, last_name, language_code, timezone)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (chat_id) DO NOTHING
             RETURNING {USER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, UserRecord>(&insert)
            .bind(Uuid::new_v4())
            .bind(chat_id)
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(profile.language.as_str())
            .bind(&profile.timezone)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        if let Some(record) = inserted {
            return Ok((record.to_domain(), true));
        }

        let select = format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&select)
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("User with chat id {} not found", chat_id))
                }
                _ => unexpected(e),
            })?;
        Ok((record.to_domain(), false))
    }

    async fn get_by_chat_id(&self, chat_id: i64) -> PortResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn update_language(&self, user_id: Uuid, language: Language) -> PortResult<User> {
        let query = format!(
            "UPDATE users SET language_code = $2, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .bind(language.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| user_not_found_or(e, user_id))?;
        Ok(record.to_domain())
    }

    async fn update_timezone(&self, user_id: Uuid, timezone: &str) -> PortResult<User> {
        let query = format!(
            "UPDATE users SET timezone = $2, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .bind(timezone)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| user_not_found_or(e, user_id))?;
        Ok(record.to_domain())
    }

    async fn complete_onboarding(&self, user_id: Uuid, goals: &SleepGoals) -> PortResult<User> {
        let query = format!(
            "UPDATE users
             SET target_bedtime = $2, target_wake_time = $3, target_sleep_hours = $4,
                 is_onboarded = TRUE, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .bind(goals.target_bedtime)
            .bind(goals.target_wake_time)
            .bind(goals.target_sleep_hours)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| user_not_found_or(e, user_id))?;
        Ok(record.to_domain())
    }

    async fn update_sleep_goals(&self, user_id: Uuid, goals: &SleepGoals) -> PortResult<User> {
        let query = format!(
            "UPDATE users
             SET target_bedtime = $2, target_wake_time = $3, target_sleep_hours = $4,
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .bind(goals.target_bedtime)
            .bind(goals.target_wake_time)
            .bind(goals.target_sleep_hours)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| user_not_found_or(e, user_id))?;
        Ok(record.to_domain())
    }
}

fn user_not_found_or(e: sqlx::Error, user_id: Uuid) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
        _ => unexpected(e),
    }
}

fn session_not_found_or(e: sqlx::Error, session_id: Uuid) -> PortError {
    match e {
        sqlx::Error::RowNotFound => {
            PortError::NotFound(format!("Sleep session {} not found", session_id))
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// `SleepSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SleepSessionStore for DbAdapter {
    async fn get_active(&self, user_id: Uuid) -> PortResult<Option<SleepSession>> {
        // Defensive ordering: there should be at most one open session, but
        // pick the latest start if that invariant was ever violated.
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sleep_sessions
             WHERE user_id = $1 AND sleep_end IS NULL
             ORDER BY sleep_start DESC
             LIMIT 1"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn get_last_completed(&self, user_id: Uuid) -> PortResult<Option<SleepSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sleep_sessions
             WHERE user_id = $1 AND sleep_end IS NOT NULL
             ORDER BY sleep_end DESC
             LIMIT 1"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn create(&self, user_id: Uuid, sleep_start: DateTime<Utc>)
        -> PortResult<SleepSession>
    {
        let query = format!(
            "INSERT INTO sleep_sessions (id, user_id, sleep_start)
             VALUES ($1, $2, $3)
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(sleep_start)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn complete(
        &self,
        session_id: Uuid,
        sleep_end: DateTime<Utc>,
        duration_hours: f64,
    ) -> PortResult<SleepSession> {
        let query = format!(
            "UPDATE sleep_sessions SET sleep_end = $2, duration_hours = $3
             WHERE id = $1
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session_id)
            .bind(sleep_end)
            .bind(duration_hours)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| session_not_found_or(e, session_id))?;
        Ok(record.to_domain())
    }

    async fn set_quality_rating(&self, session_id: Uuid, rating: f64)
        -> PortResult<SleepSession>
    {
        let query = format!(
            "UPDATE sleep_sessions SET quality_rating = $2
             WHERE id = $1
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session_id)
            .bind(rating)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| session_not_found_or(e, session_id))?;
        Ok(record.to_domain())
    }

    async fn set_note(&self, session_id: Uuid, note: &str) -> PortResult<SleepSession> {
        let query = format!(
            "UPDATE sleep_sessions SET note = $2
             WHERE id = $1
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session_id)
            .bind(note)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| session_not_found_or(e, session_id))?;
        Ok(record.to_domain())
    }

    async fn delete(&self, session_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM sleep_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        completed_only: bool,
    ) -> PortResult<Vec<SleepSession>> {
        let completed_filter = if completed_only {
            " AND sleep_end IS NOT NULL"
        } else {
            ""
        };
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sleep_sessions
             WHERE user_id = $1 AND sleep_start >= $2 AND sleep_start <= $3{completed_filter}
             ORDER BY sleep_start ASC"
        );
        let records = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(SessionRecord::to_domain).collect())
    }

    async fn list_all(&self, user_id: Uuid, completed_only: bool)
        -> PortResult<Vec<SleepSession>>
    {
        let completed_filter = if completed_only {
            " AND sleep_end IS NOT NULL"
        } else {
            ""
        };
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sleep_sessions
             WHERE user_id = $1{completed_filter}
             ORDER BY sleep_start DESC"
        );
        let records = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(SessionRecord::to_domain).collect())
    }

    async fn first_session_start(&self, user_id: Uuid) -> PortResult<Option<DateTime<Utc>>> {
        let start = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MIN(sleep_start) FROM sleep_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(start)
    }

    async fn aggregate(
        &self,
        user_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PortResult<SleepStatistics> {
        // COUNT/AVG/SUM over zero rows collapse to the all-zero result via
        // COALESCE; AVG skips NULL quality ratings on its own.
        let record = sqlx::query_as::<_, StatsRecord>(
            "SELECT COUNT(*) AS total_sessions,
                    COALESCE(AVG(duration_hours), 0) AS avg_duration,
                    COALESCE(AVG(quality_rating), 0) AS avg_quality,
                    COALESCE(SUM(duration_hours), 0) AS total_sleep_hours
             FROM sleep_sessions
             WHERE user_id = $1
               AND sleep_end IS NOT NULL
               AND ($2::timestamptz IS NULL OR sleep_start >= $2)
               AND ($3::timestamptz IS NULL OR sleep_start <= $3)",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `DialogStateStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DialogStateStore for DbAdapter {
    async fn load(&self, user_id: Uuid) -> PortResult<Option<String>> {
        let state = sqlx::query_scalar::<_, String>(
            "SELECT state::text FROM dialog_states WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(state)
    }

    async fn save(&self, user_id: Uuid, state: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO dialog_states (user_id, state)
             VALUES ($1, $2::jsonb)
             ON CONFLICT (user_id)
             DO UPDATE SET state = EXCLUDED.state, updated_at = now()",
        )
        .bind(user_id)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM dialog_states WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
