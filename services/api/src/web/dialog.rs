//! services/api/src/web/dialog.rs
//!
//! The per-user dialogue state machine.
//!
//! Each variant is one awaited answer; the whole value is serialized into
//! the dialog state store between turns, so a conversation survives process
//! restarts. No state row means the user is idle.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sleep_assistant_core::domain::User;
use sleep_assistant_core::ports::{DialogStateStore, PortError, PortResult};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DialogState {
    /// Collecting language, goals and timezone from a new user.
    Onboarding(OnboardingStep),
    /// A start conflict was shown; awaiting one of the three resolutions.
    ConflictPrompt,
    /// A rating/note update is held back pending explicit confirmation.
    ConfirmUpdate(PendingUpdate),
    /// /stats was issued; awaiting a reporting period.
    StatsPeriod,
    /// Awaiting one bound of a custom date range.
    StatsCustomRange(StatsRangeStep),
    /// Awaiting an export format for the resolved range.
    StatsFormat(StatsQuery),
}

/// Onboarding questions, asked in order. Answers collected so far ride
/// along in the variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OnboardingStep {
    Language,
    Bedtime,
    WakeTime {
        bedtime: NaiveTime,
    },
    TargetHours {
        bedtime: NaiveTime,
        wake_time: NaiveTime,
    },
    Timezone {
        bedtime: NaiveTime,
        wake_time: NaiveTime,
        target_hours: i32,
    },
}

/// A rating or note held back until the user confirms overwriting or a
/// stale session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PendingUpdate {
    Quality { session_id: Uuid, rating: f64 },
    Note { session_id: Uuid, text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatsRangeStep {
    From,
    To { from: NaiveDate },
}

/// Resolved reporting range plus the label key used in messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub period_key: String,
}

pub async fn load(store: &dyn DialogStateStore, user: &User) -> PortResult<Option<DialogState>> {
    let Some(raw) = store.load(user.id).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(state) => Ok(Some(state)),
        // A state written by an older build; drop it rather than wedge the user.
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "dialog_state_unreadable");
            store.clear(user.id).await?;
            Ok(None)
        }
    }
}

pub async fn save(
    store: &dyn DialogStateStore,
    user: &User,
    state: &DialogState,
) -> PortResult<()> {
    let raw = serde_json::to_string(state).map_err(|e| PortError::Unexpected(e.to_string()))?;
    store.save(user.id, &raw).await
}

pub async fn clear(store: &dyn DialogStateStore, user: &User) -> PortResult<()> {
    store.clear(user.id).await
}
